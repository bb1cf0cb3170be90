//! Action handlers
//!
//! Each handler runs on its own worker thread and borrows the run's
//! [`ActionContext`]. Handlers report failures as plain errors; the executor
//! wraps them with the action name.

mod copy;
mod execute;
mod rename;

use crate::action::Action;
use crate::context::ActionContext;
use crate::error::{Error, Result};
use crate::transport::{FileTransfer, LocalFs, Session, base_name};
use crate::types::ActionKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Run one action to completion
pub(crate) fn process(action: &Action, ctx: &ActionContext<'_>) -> Result<()> {
    let binding = action.binding();
    match &action.kind {
        ActionKind::Copy(spec) => copy::run(spec, binding, ctx),
        ActionKind::Move(spec) => rename::run(spec, binding, ctx),
        ActionKind::Execute(spec) => execute::run(spec, binding, ctx),
    }
}

/// File access for one side of a transfer: the session's channel or the local disk
fn open_side<'a>(session: Option<&'a Arc<dyn Session>>) -> Result<Box<dyn FileTransfer + 'a>> {
    match session {
        Some(session) => session.file_transfer(),
        None => Ok(Box::new(LocalFs)),
    }
}

/// Destination of a copy or move
///
/// An empty `to` becomes the base name of `from`, inside the work folder
/// when the destination is local and relative to the login directory when
/// it is remote.
fn destination(from: &Path, to: &str, remote: bool, folder: &Path) -> Result<PathBuf> {
    if !to.is_empty() {
        return Ok(PathBuf::from(to));
    }
    let name = base_name(from).ok_or_else(|| Error::NoFileName(from.to_path_buf()))?;
    Ok(if remote { name } else { folder.join(name) })
}

/// Lexically resolve `.` and `..`, joining a relative path to `base` when given
///
/// Symlinks are not followed. `..` above the root or above the start of a
/// relative path is dropped, so `a/../..` becomes the empty path.
fn normalize(path: &Path, base: Option<&Path>) -> PathBuf {
    let joined;
    let path = match base {
        Some(base) if path.is_relative() => {
            joined = base.join(path);
            joined.as_path()
        }
        _ => path,
    };

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}
