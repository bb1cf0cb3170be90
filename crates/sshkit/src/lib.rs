//! # Sshkit
//!
//! libssh2 transport for actiongraph: opens authenticated sessions, runs
//! commands over exec channels and moves files over SFTP.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sshkit::SshConnector;
//!
//! let connector = Arc::new(SshConnector::new().connect_timeout(Duration::from_secs(10)));
//! let summary = actiongraph::execute_simple(plan, connector)?;
//! ```

pub mod connector;
pub mod error;
mod nonblocking;
pub mod session;
pub mod sftp;

pub use connector::{DEFAULT_PORT, SshConnector, default_known_hosts, split_host_port};
pub use error::{Error, Result};
pub use session::SshSession;
pub use sftp::SftpTransfer;
