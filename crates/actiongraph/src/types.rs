//! Core types for deploy runs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Output;

/// A path on the local machine or on a named connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Connection name; absent or empty means the local machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default)]
    pub path: String,
}

impl Location {
    /// A path on the local machine
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            connection: None,
            path: path.into(),
        }
    }

    /// A path on the named connection
    pub fn remote(connection: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            connection: Some(connection.into()),
            path: path.into(),
        }
    }

    /// Connection name, treating an empty string as local
    pub fn connection(&self) -> Option<&str> {
        self.connection.as_deref().filter(|name| !name.is_empty())
    }

    /// Check if the path lives on a remote host
    pub fn is_remote(&self) -> bool {
        self.connection().is_some()
    }

    /// Side label used in messages: the connection name or "local"
    pub fn side(&self) -> &str {
        self.connection().unwrap_or("local")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.connection() {
            Some(connection) => write!(f, "{connection}:{}", self.path),
            None => write!(f, "{}", self.path),
        }
    }
}

/// How a connection authenticates
///
/// Decoded from the `type` discriminator: `key`, `password` or `agent`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credential {
    /// Private key file, optionally protected by a passphrase
    Key {
        #[serde(default)]
        host: String,
        #[serde(default)]
        username: String,
        #[serde(rename = "file", default)]
        key_file: PathBuf,
        #[serde(rename = "password", default, skip_serializing_if = "Option::is_none")]
        passphrase: Option<String>,
    },
    /// Account password
    Password {
        #[serde(default)]
        host: String,
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    /// Keys offered by a running SSH agent
    Agent {
        #[serde(default)]
        host: String,
        #[serde(default)]
        username: String,
    },
}

impl Credential {
    /// Discriminator string as written in the run descriptor
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Key { .. } => "key",
            Self::Password { .. } => "password",
            Self::Agent { .. } => "agent",
        }
    }

    /// Host, optionally with a `:port` suffix
    pub fn host(&self) -> &str {
        match self {
            Self::Key { host, .. } | Self::Password { host, .. } | Self::Agent { host, .. } => {
                host
            }
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Key { username, .. }
            | Self::Password { username, .. }
            | Self::Agent { username, .. } => username,
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}@{}", self.kind(), self.username(), self.host())
    }
}

// Secrets never reach logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key {
                host,
                username,
                key_file,
                passphrase,
            } => f
                .debug_struct("Key")
                .field("host", host)
                .field("username", username)
                .field("key_file", key_file)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Password { host, username, .. } => f
                .debug_struct("Password")
                .field("host", host)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Agent { host, username } => f
                .debug_struct("Agent")
                .field("host", host)
                .field("username", username)
                .finish(),
        }
    }
}

/// Copy a file or directory tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopySpec {
    #[serde(rename = "From", default)]
    pub from: Location,
    /// Empty path means "base name of `from` in the work folder"
    #[serde(rename = "To", default)]
    pub to: Location,
}

/// Rename a file or directory on one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSpec {
    #[serde(rename = "From", default)]
    pub from: Location,
    /// A connection here must match `from`'s; empty means the same side
    #[serde(rename = "To", default)]
    pub to: Location,
}

/// Run a program locally or on a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSpec {
    #[serde(rename = "Path", default)]
    pub path: Location,
    /// Deadline in seconds; zero disables it
    #[serde(default)]
    pub timeout: u64,
    /// `KEY=VALUE` entries
    #[serde(rename = "Environment", default)]
    pub environment: Vec<String>,
    #[serde(rename = "Query", default)]
    pub args: Vec<String>,
}

impl ExecuteSpec {
    /// Environment entries split into pairs; malformed entries are skipped
    pub fn environment_pairs(&self) -> Vec<(String, String)> {
        self.environment
            .iter()
            .filter_map(|entry| split_environment(entry))
            .collect()
    }
}

/// Split a `KEY=VALUE` entry, rejecting an empty key
pub fn split_environment(entry: &str) -> Option<(String, String)> {
    let (key, value) = entry.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// The operation an action performs
///
/// Decoded from the `type` discriminator: `copy`, `move` or `execute`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    Copy(CopySpec),
    Move(MoveSpec),
    Execute(ExecuteSpec),
}

impl ActionKind {
    /// Discriminator string as written in the run descriptor
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Copy(_) => "copy",
            Self::Move(_) => "move",
            Self::Execute(_) => "execute",
        }
    }

    /// One-line description for logs and `check` output
    pub fn describe(&self) -> String {
        match self {
            Self::Copy(spec) => format!("copy {} -> {}", spec.from, destination(&spec.to)),
            Self::Move(spec) => format!("move {} -> {}", spec.from, destination(&spec.to)),
            Self::Execute(spec) => {
                let mut line = format!("execute {}", spec.path);
                for arg in &spec.args {
                    line.push(' ');
                    line.push_str(arg);
                }
                if spec.timeout > 0 {
                    line.push_str(&format!(" (timeout {}s)", spec.timeout));
                }
                line
            }
        }
    }
}

fn destination(location: &Location) -> String {
    if location.path.is_empty() {
        match location.connection() {
            Some(connection) => format!("{connection}:<default>"),
            None => "<work folder>".to_string(),
        }
    } else {
        location.to_string()
    }
}

/// Where an action stands in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Never dispatched, either not reached or below a failure
    Pending,
    /// Running on a worker thread
    Dispatched,
    Succeeded,
    Failed,
}

impl ActionState {
    /// Check if the action finished, successfully or not
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Final state of one action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    pub name: String,
    pub state: ActionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Actions never dispatched because an ancestor failed
    pub skipped: usize,
    /// Shutdown arrived before connections were established
    pub interrupted: bool,
    /// One entry per action, in declaration order
    pub actions: Vec<ActionReport>,
}

impl RunSummary {
    /// Summary of a run stopped during the connect phase
    pub fn interrupted(actions: Vec<ActionReport>) -> Self {
        let skipped = actions.len();
        Self {
            skipped,
            interrupted: true,
            actions,
            ..Default::default()
        }
    }

    /// Build a summary from per-action reports
    pub fn from_reports(actions: Vec<ActionReport>) -> Self {
        let mut summary = Self::default();
        for report in &actions {
            match report.state {
                ActionState::Succeeded => summary.succeeded += 1,
                ActionState::Failed => summary.failed += 1,
                ActionState::Pending | ActionState::Dispatched => summary.skipped += 1,
            }
        }
        summary.actions = actions;
        summary
    }

    /// Check if every dispatched action succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }

    /// Total number of actions in the run
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    /// Report for the named action (first match)
    pub fn action(&self, name: &str) -> Option<&ActionReport> {
        self.actions.iter().find(|report| report.name == name)
    }
}

/// Output captured from a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code, `None` when killed by a signal
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
