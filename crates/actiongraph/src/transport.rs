//! Transport traits and the local filesystem transport
//!
//! The engine never talks to SSH directly. A [`Connector`] turns a
//! [`Credential`] into a shared [`Session`]; a session runs commands and
//! opens [`FileTransfer`] sub-sessions. The local machine is a
//! [`FileTransfer`] too ([`LocalFs`]), so the copy and move handlers treat
//! both sides the same way.

use crate::error::Result;
use crate::types::{CommandOutput, Credential};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Opens sessions to remote hosts
///
/// Called once per connection, from the connection's own thread.
pub trait Connector: Send + Sync {
    fn connect(&self, credential: &Credential) -> Result<Arc<dyn Session>>;
}

/// An authenticated session to one remote host
///
/// One session is shared by every action that references the connection,
/// possibly from several threads at once.
pub trait Session: Send + Sync {
    /// Run a command to completion, capturing its output
    ///
    /// When `deadline` passes first the command's channel is closed and
    /// [`Error::Timeout`](crate::Error::Timeout) returned; the session stays
    /// usable for other actions.
    fn exec(&self, request: &CommandRequest, deadline: Option<Duration>) -> Result<CommandOutput>;

    /// Open a file-transfer channel, released when dropped
    fn file_transfer(&self) -> Result<Box<dyn FileTransfer + '_>>;
}

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Final path component
    pub name: String,
    pub kind: EntryKind,
}

/// Filesystem operations used by the copy and move handlers
///
/// Implementors provide the primitive operations; recursive creation and
/// removal are derived from them.
pub trait FileTransfer {
    /// Kind of the entry at `path`, following symlinks
    fn metadata(&self, path: &Path) -> io::Result<EntryKind>;

    /// Entries of a directory, without `.` and `..`
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    /// Create a single directory
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove an empty directory
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Open a file for reading
    fn open<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Read + 'a>>;

    /// Create or truncate a file for writing
    fn create<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Write + 'a>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn exists(&self, path: &Path) -> io::Result<bool> {
        match self.metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a directory and all missing parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        if path.as_os_str().is_empty() || self.exists(path)? {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        match self.create_dir(path) {
            Ok(()) => Ok(()),
            // Another action may have created it in the meantime.
            Err(_) if self.metadata(path).is_ok_and(|kind| kind.is_dir()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Remove a file or a directory tree; a missing path is not an error
    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let kind = match self.metadata(path) {
            Ok(kind) => kind,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if !kind.is_dir() {
            return self.remove_file(path);
        }
        for entry in self.read_dir(path)? {
            self.remove_all(&path.join(&entry.name))?;
        }
        self.remove_dir(path)
    }
}

/// The local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileTransfer for LocalFs {
    fn metadata(&self, path: &Path) -> io::Result<EntryKind> {
        let metadata = fs::metadata(path)?;
        Ok(if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let kind = self.metadata(&entry.path())?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn open<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(fs::File::open(path)?))
    }

    fn create<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Write + 'a>> {
        Ok(Box::new(fs::File::create(path)?))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let result = match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// A command to run on a remote session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    /// Command as understood by the remote shell
    pub program: String,
    pub args: Vec<String>,
    /// Variables set for this command only
    pub environment: Vec<(String, String)>,
}

impl CommandRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Render the request as a single shell command line
    ///
    /// Environment assignments and arguments are quoted; the program is
    /// passed through as written so it may use shell syntax.
    pub fn command_line(&self) -> String {
        let mut line = String::new();
        for (key, value) in &self.environment {
            line.push_str(key);
            line.push('=');
            line.push_str(&quote(value));
            line.push(' ');
        }
        line.push_str(&self.program);
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line
    }
}

/// Quote a word for a POSIX shell
pub fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./=:,+@%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Base name of `path`, used for default destinations
pub(crate) fn base_name(path: &Path) -> Option<PathBuf> {
    path.file_name().map(PathBuf::from)
}
