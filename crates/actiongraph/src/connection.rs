//! Named connections and their sessions

use crate::error::{Error, Errors};
use crate::transport::Session;
use crate::types::Credential;
use std::fmt;
use std::sync::Arc;

/// Index of a connection inside a [`Plan`](crate::Plan)
pub type ConnectionId = usize;

/// A named remote host and, once connected, its session
pub struct Connection {
    pub name: String,
    pub credential: Credential,
    session: Option<Arc<dyn Session>>,
}

impl Connection {
    pub fn new(name: impl Into<String>, credential: Credential) -> Self {
        Self {
            name: name.into(),
            credential,
            session: None,
        }
    }

    /// The open session, present only after a successful connect
    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub(crate) fn attach(&mut self, session: Arc<dyn Session>) {
        self.session = Some(session);
    }

    /// Push every empty required field onto `errors`
    pub fn validate(&self, errors: &mut Errors) {
        let missing = |field| Error::MissingField {
            entity: "connection",
            name: self.name.clone(),
            field,
        };

        if self.name.is_empty() {
            errors.push(missing("name"));
        }
        if self.credential.host().is_empty() {
            errors.push(missing("host"));
        }
        if self.credential.username().is_empty() {
            errors.push(missing("username"));
        }
        match &self.credential {
            Credential::Key { key_file, .. } if key_file.as_os_str().is_empty() => {
                errors.push(missing("file"));
            }
            Credential::Password { password, .. } if password.is_empty() => {
                errors.push(missing("password"));
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// First connection with the given name
pub fn find(connections: &[Connection], name: &str) -> Option<ConnectionId> {
    connections.iter().position(|connection| connection.name == name)
}
