//! # Actiongraph
//!
//! An engine for running a forest of dependent deploy actions across local
//! and remote hosts.
//!
//! ## Core Concepts
//!
//! - **Connection**: A named remote host and its credential
//! - **Action**: A copy, move or execute, optionally following another action
//! - **Plan**: A validated deploy with every reference resolved
//! - **Executor**: Opens every session, then runs each action on its own
//!   thread as soon as its prerequisite succeeds
//!
//! ## Example
//!
//! ```ignore
//! use actiongraph::{Action, ActionKind, ExecuteSpec, Deploy, Location, execute_simple};
//!
//! let plan = Deploy::new("/tmp/deploy")
//!     .action(Action::new("build", ActionKind::Execute(ExecuteSpec {
//!         path: Location::local("make"),
//!         timeout: 600,
//!         environment: vec!["PROFILE=release".into()],
//!         args: vec!["dist".into()],
//!     })))
//!     .prepare()?;
//!
//! let summary = execute_simple(plan, connector)?;
//! ```
//!
//! ## Provider Traits
//!
//! - [`Connector`] / [`Session`]: Open and use remote sessions
//! - [`FileTransfer`]: Filesystem access on either side of a copy or move
//! - [`RunObserver`]: Receives progress updates
//!
//! The engine itself never talks to SSH or a terminal.

pub mod action;
pub mod connection;
pub mod context;
pub mod error;
pub mod executor;
mod handler;
pub mod planner;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use action::{Action, ActionId, Binding};
pub use connection::{Connection, ConnectionId};
pub use context::{ActionContext, NoObserver, Phase, RunObserver, Shutdown};
pub use error::{Error, ErrorCategory, Errors, Result};
pub use executor::{execute, execute_simple};
pub use planner::{Deploy, Plan};
pub use transport::{
    CommandRequest, Connector, DirEntry, EntryKind, FileTransfer, LocalFs, Session, quote,
};
pub use types::{
    ActionKind, ActionReport, ActionState, CommandOutput, CopySpec, Credential, ExecuteSpec,
    Location, MoveSpec, RunSummary,
};
