//! Move handler

use super::{destination, open_side};
use crate::action::Binding;
use crate::context::ActionContext;
use crate::error::{Error, Result};
use crate::types::MoveSpec;
use std::path::Path;

pub(super) fn run(spec: &MoveSpec, binding: Binding, ctx: &ActionContext<'_>) -> Result<()> {
    let session = ctx.session(binding.source)?;
    let fs = open_side(session)?;

    let from = Path::new(&spec.from.path);
    fs.metadata(from).map_err(|e| Error::io(from, e))?;

    let to = destination(from, &spec.to.path, session.is_some(), ctx.folder)?;
    if let Some(parent) = to.parent() {
        fs.create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    log::debug!("Renaming {} to {} on {}", from.display(), to.display(), spec.from.side());
    fs.rename(from, &to).map_err(|e| Error::io(from, e))
}
