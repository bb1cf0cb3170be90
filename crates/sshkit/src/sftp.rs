//! SFTP file transfer

use crate::nonblocking::{Blocking, retry};
use actiongraph::{DirEntry, EntryKind, FileTransfer};
use ssh2::Sftp;
use std::io::{self, Read, Write};
use std::path::Path;

const DIR_MODE: i32 = 0o755;

/// One SFTP channel, closed when dropped
///
/// Relative paths resolve against the login directory. The session is
/// non-blocking, so each call is retried until libssh2 completes it.
pub struct SftpTransfer {
    sftp: Sftp,
}

impl SftpTransfer {
    pub fn new(sftp: Sftp) -> Self {
        Self { sftp }
    }
}

fn kind(stat: &ssh2::FileStat) -> EntryKind {
    if stat.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::File
    }
}

impl FileTransfer for SftpTransfer {
    fn metadata(&self, path: &Path) -> io::Result<EntryKind> {
        let stat = retry(|| self.sftp.stat(path))?;
        Ok(kind(&stat))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries: Vec<DirEntry> = retry(|| self.sftp.readdir(path))?
            .into_iter()
            .filter_map(|(entry, stat)| {
                let name = entry.file_name()?.to_string_lossy().to_string();
                if name == "." || name == ".." {
                    return None;
                }
                Some(DirEntry {
                    name,
                    kind: kind(&stat),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        Ok(retry(|| self.sftp.mkdir(path, DIR_MODE))?)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        Ok(retry(|| self.sftp.unlink(path))?)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        Ok(retry(|| self.sftp.rmdir(path))?)
    }

    fn open<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Read + 'a>> {
        Ok(Box::new(Blocking(retry(|| self.sftp.open(path))?)))
    }

    fn create<'a>(&'a self, path: &Path) -> io::Result<Box<dyn Write + 'a>> {
        Ok(Box::new(Blocking(retry(|| self.sftp.create(path))?)))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        Ok(retry(|| self.sftp.rename(from, to, None))?)
    }
}
