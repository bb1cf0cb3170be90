//! Error types for deploy runs.
//!
//! Every error maps to an [`ErrorCategory`] which tells the caller how far the
//! failure reaches: configuration and reference errors stop a run before any
//! side effect, connect errors stop it before any action, and action errors
//! only prune the failing action's dependents.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for deploy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of deploy errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or malformed field in the run descriptor.
    Configuration,
    /// A `follow` or connection name that resolves to nothing, or a follow cycle.
    Reference,
    /// Authentication or network failure while opening a session.
    Connect,
    /// Copy, move or execute failure at runtime.
    Action,
    /// An execute action ran past its deadline.
    Timeout,
}

impl ErrorCategory {
    /// Whether errors of this category abort the run before any action executes.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration | Self::Reference | Self::Connect)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Invalid run descriptor",
            Self::Reference => "Unresolved reference",
            Self::Connect => "Connection failed",
            Self::Action => "Action failed",
            Self::Timeout => "Action timed out",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Fill in the required fields listed above",
            Self::Reference => "Check the spelling of follow and connection names",
            Self::Connect => "Verify host, credentials and that the host is in known_hosts",
            Self::Action => "Dependents of the failed action were skipped; fix it and rerun",
            Self::Timeout => "Raise the timeout or make the command finish sooner",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while preparing or running a deploy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The work folder was not set.
    #[error("deploy folder is empty")]
    FolderEmpty,

    /// A required field of a connection or action is empty.
    #[error("{entity} '{name}': {field} is empty")]
    MissingField {
        /// Kind of entry ("connection", "copy", ...).
        entity: &'static str,
        /// Name of the entry.
        name: String,
        /// Name of the empty field.
        field: &'static str,
    },

    /// An environment entry is not of the form `KEY=VALUE`.
    #[error("action '{action}': invalid environment entry '{entry}' (expected KEY=VALUE)")]
    InvalidEnvironment {
        /// Action carrying the entry.
        action: String,
        /// The offending entry.
        entry: String,
    },

    /// A move whose ends live on different transports.
    #[error("action '{action}': cannot move from {from} to {to}, moves stay on one host")]
    CrossTransportMove {
        /// Action name.
        action: String,
        /// Source side ("local" or a connection name).
        from: String,
        /// Destination side.
        to: String,
    },

    /// An action names a connection that does not exist.
    #[error("action '{action}': unknown connection reference '{connection}'")]
    UnknownConnection {
        /// Action name.
        action: String,
        /// The unresolved connection name.
        connection: String,
    },

    /// An action follows an action that does not exist.
    #[error("action '{action}': unknown follow reference '{follow}'")]
    UnknownFollow {
        /// Action name.
        action: String,
        /// The unresolved action name.
        follow: String,
    },

    /// Follow references loop back on themselves.
    #[error("follow cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// Opening a session failed.
    #[error("connection '{connection}': {source}")]
    Connect {
        /// Connection name.
        connection: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// An action failed at runtime.
    #[error("action '{action}': {source}")]
    Action {
        /// Action name.
        action: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A command ran past its deadline.
    #[error("timed out after {seconds}s")]
    Timeout {
        /// Configured deadline.
        seconds: u64,
    },

    /// A command exited unsuccessfully.
    #[error("{program} {}", exit_description(.code))]
    CommandFailed {
        /// Program that was run.
        program: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
    },

    /// A local program could not be found on `PATH`.
    #[error("program not found: {program}")]
    ProgramNotFound {
        /// The program name.
        program: String,
    },

    /// A path has no final component to derive a default destination from.
    #[error("cannot derive a file name from {}", .0.display())]
    NoFileName(PathBuf),

    /// IO error during file operations.
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Failure reported by a transport backend.
    #[error("{0}")]
    Transport(String),

    /// An action handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// Several errors joined together.
    #[error("{0}")]
    Multiple(Errors),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a transport error from any displayable failure.
    pub fn transport(message: impl fmt::Display) -> Self {
        Self::Transport(message.to_string())
    }

    /// Wrap an error as the failure of the named action.
    pub fn action(action: impl Into<String>, source: Error) -> Self {
        Self::Action {
            action: action.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an error as the failure of the named connection.
    pub fn connect(connection: impl Into<String>, source: Error) -> Self {
        Self::Connect {
            connection: connection.into(),
            source: Box::new(source),
        }
    }

    /// Get the error category.
    ///
    /// Wrapped errors report the category of their cause where that is more
    /// specific, so an action that timed out is [`ErrorCategory::Timeout`].
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::FolderEmpty
            | Error::MissingField { .. }
            | Error::InvalidEnvironment { .. }
            | Error::CrossTransportMove { .. } => ErrorCategory::Configuration,
            Error::UnknownConnection { .. }
            | Error::UnknownFollow { .. }
            | Error::DependencyCycle(_) => ErrorCategory::Reference,
            Error::Connect { .. } => ErrorCategory::Connect,
            Error::Action { source, .. } => match source.category() {
                ErrorCategory::Timeout => ErrorCategory::Timeout,
                _ => ErrorCategory::Action,
            },
            Error::Timeout { .. } => ErrorCategory::Timeout,
            Error::CommandFailed { .. }
            | Error::ProgramNotFound { .. }
            | Error::NoFileName(_)
            | Error::Io { .. }
            | Error::Transport(_)
            | Error::Panicked(_) => ErrorCategory::Action,
            Error::Multiple(errors) => errors
                .iter()
                .map(Error::category)
                .next()
                .unwrap_or(ErrorCategory::Action),
        }
    }

    /// Whether this error (or its cause) is a deadline overrun.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    /// Flatten joined errors into their individual members.
    pub fn leaves(&self) -> Vec<&Error> {
        match self {
            Error::Multiple(errors) => errors.iter().flat_map(Error::leaves).collect(),
            other => vec![other],
        }
    }
}

/// An ordered collection of errors reported together.
///
/// Displays one error per line.
#[derive(Debug, Default)]
pub struct Errors(Vec<Error>);

impl Errors {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add an error.
    pub fn push(&mut self, error: Error) {
        self.0.push(error);
    }

    /// Whether no errors were collected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of collected errors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the collected errors.
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    /// `Ok` when empty, the single error when there is one, and
    /// [`Error::Multiple`] otherwise.
    pub fn into_result(mut self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(Error::Multiple(self)),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl Extend<Error> for Errors {
    fn extend<I: IntoIterator<Item = Error>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for Errors {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
