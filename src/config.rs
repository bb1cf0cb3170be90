//! Run descriptor loading
//!
//! The descriptor is YAML unless the file extension says `.json` or `.toml`.

use actiongraph::{Action, ActionKind, Connection, Credential, Deploy};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Descriptor file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl Format {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::Json,
            Some("toml") => Self::Toml,
            _ => Self::Yaml,
        }
    }
}

/// A run descriptor as written by the user
#[derive(Debug, Deserialize)]
pub struct DeployFile {
    /// Work folder; `~` is expanded
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub keep: bool,
    #[serde(rename = "Remote", default)]
    pub remote: Vec<ConnectionEntry>,
    #[serde(rename = "Do", default)]
    pub actions: Vec<ActionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionEntry {
    /// Defaults to the credential type
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub credential: Credential,
}

#[derive(Debug, Deserialize)]
pub struct ActionEntry {
    /// Defaults to the action type
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub follow: Option<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl DeployFile {
    /// Read and decode a descriptor
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content, Format::from_path(path))
            .with_context(|| format!("Invalid run descriptor {}", path.display()))
    }

    pub fn parse(content: &str, format: Format) -> Result<Self> {
        let file = match format {
            Format::Yaml => serde_yaml::from_str(content)?,
            Format::Json => serde_json::from_str(content)?,
            Format::Toml => toml::from_str(content)?,
        };
        Ok(file)
    }

    /// Build the engine's deploy, applying name defaults and `~` expansion
    pub fn into_deploy(self) -> Deploy {
        let mut deploy = Deploy::new(expand(&self.folder)).keep(self.keep);

        for entry in self.remote {
            let name = entry
                .name
                .unwrap_or_else(|| entry.credential.kind().to_string());
            deploy = deploy.connection(Connection::new(name, expand_key_file(entry.credential)));
        }

        for entry in self.actions {
            let name = entry.name.unwrap_or_else(|| entry.kind.kind().to_string());
            let mut action = Action::new(name, entry.kind);
            action.follow = entry.follow;
            deploy = deploy.action(action);
        }

        deploy
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

fn expand_key_file(credential: Credential) -> Credential {
    match credential {
        Credential::Key {
            host,
            username,
            key_file,
            passphrase,
        } => Credential::Key {
            host,
            username,
            key_file: expand(&key_file.to_string_lossy()),
            passphrase,
        },
        other => other,
    }
}
