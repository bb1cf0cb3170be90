//! In-memory transport for tests

use crate::error::{Error, Result};
use crate::transport::{CommandRequest, Connector, DirEntry, EntryKind, FileTransfer, Session};
use crate::types::{CommandOutput, Credential};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Node {
    File(Vec<u8>),
    Dir,
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))
}

fn is_root(path: &Path) -> bool {
    path.as_os_str().is_empty() || path == Path::new("/") || path == Path::new(".")
}

/// A filesystem kept in a shared map; clones see the same files
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    nodes: Arc<Mutex<BTreeMap<PathBuf, Node>>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, creating parent directories
    pub fn insert_file(&self, path: &str, content: &[u8]) {
        let path = PathBuf::from(path);
        let mut nodes = self.nodes.lock().unwrap();
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if !is_root(dir) {
                nodes.insert(dir.to_path_buf(), Node::Dir);
            }
            parent = dir.parent();
        }
        nodes.insert(path, Node::File(content.to_vec()));
    }

    pub fn read(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().unwrap().get(Path::new(path)) {
            Some(Node::File(content)) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(
            self.nodes.lock().unwrap().get(Path::new(path)),
            Some(Node::Dir)
        )
    }

    pub fn contains(&self, path: &str) -> bool {
        self.nodes.lock().unwrap().contains_key(Path::new(path))
    }

    fn parent_exists(&self, path: &Path) -> bool {
        match path.parent() {
            None => true,
            Some(parent) if is_root(parent) => true,
            Some(parent) => matches!(self.nodes.lock().unwrap().get(parent), Some(Node::Dir)),
        }
    }
}

impl FileTransfer for MemoryFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryKind> {
        if is_root(path) {
            return Ok(EntryKind::Directory);
        }
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File(_)) => Ok(EntryKind::File),
            Some(Node::Dir) => Ok(EntryKind::Directory),
            None => Err(not_found(path)),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        if !self.metadata(path)?.is_dir() {
            return Err(io::Error::other(format!("{} is not a directory", path.display())));
        }
        let nodes = self.nodes.lock().unwrap();
        Ok(nodes
            .iter()
            .filter(|(child, _)| child.parent() == Some(path))
            .map(|(child, node)| DirEntry {
                name: child
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default(),
                kind: match node {
                    Node::File(_) => EntryKind::File,
                    Node::Dir => EntryKind::Directory,
                },
            })
            .collect())
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        if !self.parent_exists(path) {
            return Err(not_found(path));
        }
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "exists"));
        }
        nodes.insert(path.to_path_buf(), Node::Dir);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::File(_)) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(io::Error::other("is a directory")),
            None => Err(not_found(path)),
        }
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.keys().any(|child| child.parent() == Some(path)) {
            return Err(io::Error::other("directory not empty"));
        }
        match nodes.remove(path) {
            Some(_) => Ok(()),
            None => Err(not_found(path)),
        }
    }

    fn open<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Read + 'a>> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(Node::Dir) => Err(io::Error::other("is a directory")),
            None => Err(not_found(path)),
        }
    }

    fn create<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Write + 'a>> {
        if !self.parent_exists(path) {
            return Err(not_found(path));
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::File(Vec::new()));
        Ok(Box::new(MemoryWriter {
            fs: self.clone(),
            path: path.to_path_buf(),
            buffer: Vec::new(),
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if !self.parent_exists(to) {
            return Err(not_found(to));
        }
        let mut nodes = self.nodes.lock().unwrap();
        if !nodes.contains_key(from) {
            return Err(not_found(from));
        }
        let moved: Vec<PathBuf> = nodes
            .keys()
            .filter(|path| path.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = nodes.remove(&old) {
                let suffix = old.strip_prefix(from).unwrap_or(Path::new(""));
                let new = if suffix.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(suffix)
                };
                nodes.insert(new, node);
            }
        }
        Ok(())
    }
}

struct MemoryWriter {
    fs: MemoryFs,
    path: PathBuf,
    buffer: Vec<u8>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.fs
            .nodes
            .lock()
            .unwrap()
            .insert(self.path.clone(), Node::File(self.buffer.clone()));
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// A session whose files live in a [`MemoryFs`]
///
/// `exec` records the command line and answers with `exit_code`. The
/// program `sleep` blocks for the number of seconds in its first argument,
/// cut short by the deadline, and the program `panic` panics.
#[derive(Debug, Default)]
pub struct MemorySession {
    pub fs: MemoryFs,
    pub exit_code: i32,
    pub commands: Mutex<Vec<String>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl MemorySession {
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            ..Default::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands stopped by their deadline
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

impl Session for MemorySession {
    fn exec(&self, request: &CommandRequest, deadline: Option<Duration>) -> Result<CommandOutput> {
        let command = request.command_line();
        self.commands.lock().unwrap().push(command.clone());
        if request.program == "panic" {
            panic!("session exploded");
        }
        if request.program == "sleep" {
            let wanted = Duration::from_secs(
                request
                    .args
                    .first()
                    .and_then(|arg| arg.parse().ok())
                    .unwrap_or(0),
            );
            match deadline {
                Some(limit) if limit < wanted => {
                    std::thread::sleep(limit);
                    self.cancelled.lock().unwrap().push(command);
                    return Err(Error::Timeout {
                        seconds: limit.as_secs(),
                    });
                }
                _ => std::thread::sleep(wanted),
            }
        }
        Ok(CommandOutput {
            stdout: b"remote out\n".to_vec(),
            stderr: Vec::new(),
            code: Some(self.exit_code),
        })
    }

    fn file_transfer(&self) -> Result<Box<dyn FileTransfer + '_>> {
        Ok(Box::new(self.fs.clone()))
    }
}

/// Hands out preconfigured sessions by host
#[derive(Default)]
pub struct MemoryConnector {
    sessions: HashMap<String, Arc<MemorySession>>,
    failing: Vec<String>,
    delay: Option<Duration>,
    pub connected: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, host: &str, session: Arc<MemorySession>) -> Self {
        self.sessions.insert(host.to_string(), session);
        self
    }

    /// Refuse connections to `host`
    pub fn failing(mut self, host: &str) -> Self {
        self.failing.push(host.to_string());
        self
    }

    /// Wait before answering every connect
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, credential: &Credential) -> Result<Arc<dyn Session>> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let host = credential.host();
        if self.failing.iter().any(|failing| failing == host) {
            return Err(Error::transport(format!("{host}: connection refused")));
        }
        self.connected.lock().unwrap().push(host.to_string());
        let session: Arc<dyn Session> = match self.sessions.get(host) {
            Some(session) => session.clone(),
            None => Arc::new(MemorySession::default()),
        };
        Ok(session)
    }
}

/// Agent credential for `host`
pub fn agent(host: &str) -> Credential {
    Credential::Agent {
        host: host.to_string(),
        username: "deploy".to_string(),
    }
}
