//! Copy handler

use super::{destination, normalize, open_side};
use crate::action::Binding;
use crate::context::ActionContext;
use crate::error::{Error, Result};
use crate::transport::{EntryKind, FileTransfer};
use crate::types::CopySpec;
use std::fmt;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Which sides of a copy are remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferMode {
    LocalToLocal,
    LocalToRemote,
    RemoteToLocal,
    RemoteToRemote,
}

impl TransferMode {
    fn of(binding: Binding) -> Self {
        match (binding.source.is_some(), binding.target.is_some()) {
            (false, false) => Self::LocalToLocal,
            (false, true) => Self::LocalToRemote,
            (true, false) => Self::RemoteToLocal,
            (true, true) => Self::RemoteToRemote,
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LocalToLocal => "local -> local",
            Self::LocalToRemote => "local -> remote",
            Self::RemoteToLocal => "remote -> local",
            Self::RemoteToRemote => "remote -> remote",
        };
        f.write_str(label)
    }
}

pub(super) fn run(spec: &CopySpec, binding: Binding, ctx: &ActionContext<'_>) -> Result<()> {
    let mode = TransferMode::of(binding);
    let source = open_side(ctx.session(binding.source)?)?;
    let target = open_side(ctx.session(binding.target)?)?;

    let from = Path::new(&spec.from.path);
    let to = destination(from, &spec.to.path, binding.target.is_some(), ctx.folder)?;
    log::debug!("Copying {} to {} ({mode})", from.display(), to.display());

    let kind = source.metadata(from).map_err(|e| Error::io(from, e))?;

    if let Some(parent) = to.parent() {
        let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
        let resolve = |path: &Path, remote: bool| -> PathBuf {
            normalize(path, (!remote).then_some(cwd.as_path()))
        };
        let folder = resolve(ctx.folder, false);
        let local = [folder.as_path(), cwd.as_path()];
        let anchors: &[&Path] = if binding.target.is_none() {
            &local
        } else {
            &[]
        };
        let kept = is_shared_parent(
            &resolve(parent, binding.target.is_some()),
            &resolve(from, binding.source.is_some()),
            binding.source == binding.target,
            anchors,
        );
        if kept {
            target
                .create_dir_all(parent)
                .map_err(|e| Error::io(parent, e))?;
        } else {
            log::debug!("Purging {}", parent.display());
            target.remove_all(parent).map_err(|e| Error::io(parent, e))?;
            target
                .create_dir_all(parent)
                .map_err(|e| Error::io(parent, e))?;
        }
    }

    match kind {
        EntryKind::Directory => copy_dir(&*source, from, &*target, &to),
        EntryKind::File => copy_file(&*source, from, &*target, &to).map(|_| ()),
    }
}

/// Whether the destination's parent must be kept rather than purged
///
/// Paths arrive normalized: local ones absolute against the working
/// directory, remote ones lexically only. The login directory, the
/// filesystem root, anything holding one of `anchors` (the work folder and
/// working directory of a local target) and anything holding the source on
/// the same side are only ensured to exist. A remote relative path cannot
/// be placed against an absolute one without the login directory, so on the
/// same side that pair is kept too.
fn is_shared_parent(parent: &Path, from: &Path, same_side: bool, anchors: &[&Path]) -> bool {
    if parent.as_os_str().is_empty() || parent.parent().is_none() {
        return true;
    }
    if anchors.iter().any(|anchor| anchor.starts_with(parent)) {
        return true;
    }
    same_side && (parent.is_absolute() != from.is_absolute() || from.starts_with(parent))
}

fn copy_dir(
    source: &dyn FileTransfer,
    from: &Path,
    target: &dyn FileTransfer,
    to: &Path,
) -> Result<()> {
    target.create_dir_all(to).map_err(|e| Error::io(to, e))?;
    for entry in source.read_dir(from).map_err(|e| Error::io(from, e))? {
        let from = from.join(&entry.name);
        let to = to.join(&entry.name);
        match entry.kind {
            EntryKind::Directory => copy_dir(source, &from, target, &to)?,
            EntryKind::File => {
                copy_file(source, &from, target, &to)?;
            }
        }
    }
    Ok(())
}

fn copy_file(
    source: &dyn FileTransfer,
    from: &Path,
    target: &dyn FileTransfer,
    to: &Path,
) -> Result<u64> {
    let mut reader = source.open(from).map_err(|e| Error::io(from, e))?;
    let mut writer = BufWriter::new(target.create(to).map_err(|e| Error::io(to, e))?);
    let bytes = io::copy(&mut reader, &mut writer).map_err(|e| Error::io(to, e))?;
    writer.flush().map_err(|e| Error::io(to, e))?;
    log::debug!("Copied {} ({bytes} bytes)", to.display());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::testing::{MemoryFs, MemorySession, agent};
    use crate::transport::Session;
    use crate::types::Location;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn spec(from: Location, to: Location) -> CopySpec {
        CopySpec { from, to }
    }

    fn connected(name: &str, fs: &MemoryFs) -> Connection {
        let mut connection = Connection::new(name, agent("example.com"));
        let session: Arc<dyn Session> = Arc::new(MemorySession::new(fs.clone()));
        connection.attach(session);
        connection
    }

    #[test]
    fn test_transfer_mode() {
        let binding = |source, target| Binding { source, target };
        assert_eq!(TransferMode::of(binding(None, None)), TransferMode::LocalToLocal);
        assert_eq!(TransferMode::of(binding(None, Some(0))), TransferMode::LocalToRemote);
        assert_eq!(TransferMode::of(binding(Some(0), None)), TransferMode::RemoteToLocal);
        assert_eq!(TransferMode::of(binding(Some(0), Some(1))), TransferMode::RemoteToRemote);
    }

    #[test]
    fn test_shared_parent() {
        let local: &[&Path] = &[Path::new("/tmp/work"), Path::new("/home/deploy")];
        let from = Path::new("/srv/data/a.txt");
        assert!(is_shared_parent(Path::new(""), from, false, &[]));
        assert!(is_shared_parent(Path::new("/"), from, false, local));
        assert!(is_shared_parent(Path::new("/tmp/work"), from, false, local));
        assert!(is_shared_parent(Path::new("/tmp"), from, false, local));
        assert!(is_shared_parent(Path::new("/home/deploy"), from, false, local));
        assert!(is_shared_parent(Path::new("/srv/data"), from, true, local));
        // The work folder lives on the local side only.
        assert!(!is_shared_parent(Path::new("/tmp/work"), from, false, &[]));
        assert!(!is_shared_parent(Path::new("/srv/data"), from, false, &[]));
        assert!(!is_shared_parent(Path::new("/srv/out"), from, true, local));
    }

    #[test]
    fn test_shared_parent_after_normalizing() {
        let cwd = Path::new("/home/deploy/site");
        let local: &[&Path] = &[Path::new("/tmp/work"), cwd];
        let parent = normalize(Path::new("src"), Some(cwd));
        let from = normalize(Path::new("./src/a.txt"), Some(cwd));
        assert!(is_shared_parent(&parent, &from, true, local));

        let parent = normalize(Path::new("/home/deploy/site/src"), Some(cwd));
        let from = normalize(Path::new("src/a.txt"), Some(cwd));
        assert!(is_shared_parent(&parent, &from, true, local));

        let parent = normalize(Path::new("out/../src"), Some(cwd));
        assert!(is_shared_parent(&parent, &from, true, local));

        // A bare file name lands in the working directory, which is kept.
        let parent = normalize(Path::new(""), Some(cwd));
        assert!(is_shared_parent(&parent, Path::new("/srv/a.txt"), false, local));

        // Remote paths are never joined, so relative against absolute stays.
        let parent = normalize(Path::new("/home/deploy/src"), None);
        let from = normalize(Path::new("./src/a.txt"), None);
        assert!(is_shared_parent(&parent, &from, true, &[]));
        assert!(!is_shared_parent(&parent, &from, false, &[]));
    }

    #[test]
    fn test_local_copy_keeps_source_spelled_differently() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.txt"), "alpha").unwrap();
        fs::write(src.join("sibling.txt"), "beta").unwrap();
        fs::create_dir(dir.path().join("out")).unwrap();

        let from = dir.path().join("src/./a.txt");
        let to = dir.path().join("out/../src/b.txt");
        let work = dir.path().join("work");
        let ctx = ActionContext::new(&work, &[]);
        run(
            &spec(
                Location::local(from.to_string_lossy()),
                Location::local(to.to_string_lossy()),
            ),
            Binding::default(),
            &ctx,
        )
        .unwrap();

        assert_eq!(fs::read_to_string(src.join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(src.join("sibling.txt")).unwrap(), "beta");
        assert_eq!(fs::read_to_string(src.join("b.txt")).unwrap(), "alpha");
    }

    #[test]
    fn test_remote_relative_source_to_absolute_destination() {
        let dir = TempDir::new().unwrap();
        let remote = MemoryFs::new();
        remote.insert_file("src/a.txt", b"alpha");
        remote.insert_file("/home/deploy/src/sibling.txt", b"beta");

        let connections = vec![connected("prod", &remote)];
        let ctx = ActionContext::new(dir.path(), &connections);
        run(
            &spec(
                Location::remote("prod", "src/a.txt"),
                Location::remote("prod", "/home/deploy/src/b.txt"),
            ),
            Binding {
                source: Some(0),
                target: Some(0),
            },
            &ctx,
        )
        .unwrap();

        assert_eq!(remote.read("src/a.txt").unwrap(), b"alpha");
        assert_eq!(remote.read("/home/deploy/src/sibling.txt").unwrap(), b"beta");
        assert_eq!(remote.read("/home/deploy/src/b.txt").unwrap(), b"alpha");
    }

    #[test]
    fn test_local_file_to_work_folder() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("work");
        fs::create_dir(&folder).unwrap();
        let source = dir.path().join("app.conf");
        fs::write(&source, "listen 80\n").unwrap();

        let ctx = ActionContext::new(&folder, &[]);
        run(
            &spec(Location::local(source.to_string_lossy()), Location::default()),
            Binding::default(),
            &ctx,
        )
        .unwrap();

        assert_eq!(fs::read_to_string(folder.join("app.conf")).unwrap(), "listen 80\n");
    }

    #[test]
    fn test_local_tree_purges_destination_parent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("dist");
        fs::create_dir_all(source.join("css")).unwrap();
        fs::write(source.join("index.html"), "<html>").unwrap();
        fs::write(source.join("css").join("site.css"), "body{}").unwrap();

        let release = dir.path().join("release");
        fs::create_dir(&release).unwrap();
        fs::write(release.join("stale.txt"), "old").unwrap();

        let to = release.join("dist");
        let ctx = ActionContext::new(dir.path(), &[]);
        run(
            &spec(
                Location::local(source.to_string_lossy()),
                Location::local(to.to_string_lossy()),
            ),
            Binding::default(),
            &ctx,
        )
        .unwrap();

        assert!(!release.join("stale.txt").exists());
        assert_eq!(fs::read_to_string(to.join("index.html")).unwrap(), "<html>");
        assert_eq!(fs::read_to_string(to.join("css/site.css")).unwrap(), "body{}");
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let ctx = ActionContext::new(dir.path(), &[]);
        let err = run(
            &spec(
                Location::local(dir.path().join("nope").to_string_lossy()),
                Location::default(),
            ),
            Binding::default(),
            &ctx,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_local_to_remote_default_destination() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("release.tar");
        fs::write(&source, b"tarball").unwrap();

        let remote = MemoryFs::new();
        let connections = vec![connected("prod", &remote)];
        let ctx = ActionContext::new(dir.path(), &connections);
        run(
            &spec(
                Location::local(source.to_string_lossy()),
                Location::remote("prod", ""),
            ),
            Binding {
                source: None,
                target: Some(0),
            },
            &ctx,
        )
        .unwrap();

        assert_eq!(remote.read("release.tar").unwrap(), b"tarball");
    }

    #[test]
    fn test_remote_tree_to_local() {
        let dir = TempDir::new().unwrap();
        let remote = MemoryFs::new();
        remote.insert_file("/var/log/app/a.log", b"a");
        remote.insert_file("/var/log/app/old/b.log", b"b");

        let connections = vec![connected("prod", &remote)];
        let ctx = ActionContext::new(dir.path(), &connections);
        run(
            &spec(Location::remote("prod", "/var/log/app"), Location::default()),
            Binding {
                source: Some(0),
                target: None,
            },
            &ctx,
        )
        .unwrap();

        let local = dir.path().join("app");
        assert_eq!(fs::read(local.join("a.log")).unwrap(), b"a");
        assert_eq!(fs::read(local.join("old").join("b.log")).unwrap(), b"b");
    }

    #[test]
    fn test_remote_to_remote() {
        let dir = TempDir::new().unwrap();
        let staging = MemoryFs::new();
        staging.insert_file("/srv/app/build.tar", b"artifact");
        let prod = MemoryFs::new();
        prod.insert_file("/srv/releases/old.tar", b"old");

        let connections = vec![connected("staging", &staging), connected("prod", &prod)];
        let ctx = ActionContext::new(dir.path(), &connections);
        run(
            &spec(
                Location::remote("staging", "/srv/app/build.tar"),
                Location::remote("prod", "/srv/releases/build.tar"),
            ),
            Binding {
                source: Some(0),
                target: Some(1),
            },
            &ctx,
        )
        .unwrap();

        assert_eq!(prod.read("/srv/releases/build.tar").unwrap(), b"artifact");
        assert!(!prod.contains("/srv/releases/old.tar"));
        assert!(prod.is_dir("/srv/releases"));
        assert!(staging.contains("/srv/app/build.tar"));
    }

    #[test]
    fn test_same_host_copy_keeps_source_directory() {
        let dir = TempDir::new().unwrap();
        let remote = MemoryFs::new();
        remote.insert_file("/srv/app/config.yml", b"a: 1");

        let connections = vec![connected("prod", &remote)];
        let ctx = ActionContext::new(dir.path(), &connections);
        run(
            &spec(
                Location::remote("prod", "/srv/app/config.yml"),
                Location::remote("prod", "/srv/app/config.yml.bak"),
            ),
            Binding {
                source: Some(0),
                target: Some(0),
            },
            &ctx,
        )
        .unwrap();

        assert_eq!(remote.read("/srv/app/config.yml").unwrap(), b"a: 1");
        assert_eq!(remote.read("/srv/app/config.yml.bak").unwrap(), b"a: 1");
    }
}
