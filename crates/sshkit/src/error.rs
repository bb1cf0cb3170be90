//! Error types for SSH operations.

use std::io;
use std::path::PathBuf;

/// Result type alias for SSH operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while opening or using an SSH session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The host string could not be split into host and port.
    #[error("invalid host '{0}' (expected host or host:port)")]
    InvalidHost(String),

    /// The host name did not resolve to any address.
    #[error("could not resolve {host}")]
    Resolve {
        /// Host as configured.
        host: String,
        /// Underlying resolver error, if any.
        #[source]
        source: Option<io::Error>,
    },

    /// The TCP connection could not be established.
    #[error("could not connect to {address}: {source}")]
    Connect {
        /// Address that was tried.
        address: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A libssh2 call failed.
    #[error("{context}: {source}")]
    Ssh {
        /// What was being done.
        context: &'static str,
        /// Underlying libssh2 error.
        #[source]
        source: ssh2::Error,
    },

    /// Reading command output failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being read.
        context: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A remote command ran past its deadline and its channel was closed.
    #[error("timed out after {seconds}s")]
    Timeout {
        /// Configured deadline.
        seconds: u64,
    },

    /// The host key is absent from known_hosts.
    #[error("host key for {host} not found in {}", .known_hosts.display())]
    UnknownHostKey {
        /// Host as checked.
        host: String,
        /// known_hosts file consulted.
        known_hosts: PathBuf,
    },

    /// The host key differs from the one in known_hosts.
    #[error("host key for {host} does not match {}", .known_hosts.display())]
    HostKeyMismatch {
        /// Host as checked.
        host: String,
        /// known_hosts file consulted.
        known_hosts: PathBuf,
    },

    /// The server accepted the handshake but not the credentials.
    #[error("{method} authentication rejected for {username}")]
    AuthRejected {
        /// Authentication method ("key", "password", "agent").
        method: &'static str,
        /// User name offered.
        username: String,
    },
}

impl Error {
    /// Wrap a libssh2 error with what was being done.
    pub fn ssh(context: &'static str) -> impl FnOnce(ssh2::Error) -> Self {
        move |source| Self::Ssh { context, source }
    }
}

impl From<Error> for actiongraph::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Timeout { seconds } => Self::Timeout { seconds },
            other => Self::transport(other),
        }
    }
}
