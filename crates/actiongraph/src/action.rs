//! Actions: one unit of work in the deploy graph

use crate::connection::ConnectionId;
use crate::error::{Error, Errors};
use crate::types::{ActionKind, split_environment};

/// Index of an action inside a [`Plan`](crate::Plan)
pub type ActionId = usize;

/// Connections an action's locations resolved to during prepare
///
/// `source` is the `from` side of copy and move and the host of execute;
/// `target` is the `to` side of copy. `None` means local.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Binding {
    pub source: Option<ConnectionId>,
    pub target: Option<ConnectionId>,
}

/// A named copy, move or execute with an optional prerequisite
#[derive(Debug, Clone)]
pub struct Action {
    pub name: String,
    /// Name of the action that must succeed first
    pub follow: Option<String>,
    pub kind: ActionKind,
    pub(crate) dependents: Vec<ActionId>,
    pub(crate) binding: Binding,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            follow: None,
            kind,
            dependents: Vec::new(),
            binding: Binding::default(),
        }
    }

    /// Run only after the named action succeeds
    pub fn follow(mut self, name: impl Into<String>) -> Self {
        self.follow = Some(name.into());
        self
    }

    /// Prerequisite name, treating an empty string as none
    pub fn follows(&self) -> Option<&str> {
        self.follow.as_deref().filter(|name| !name.is_empty())
    }

    /// Actions that run after this one succeeds
    pub fn dependents(&self) -> &[ActionId] {
        &self.dependents
    }

    pub fn binding(&self) -> Binding {
        self.binding
    }

    /// Connection names referenced by `(source, target)`
    pub fn connection_refs(&self) -> (Option<&str>, Option<&str>) {
        match &self.kind {
            ActionKind::Copy(spec) => (spec.from.connection(), spec.to.connection()),
            // A move stays on one side; the `to` connection is only checked.
            ActionKind::Move(spec) => (spec.from.connection(), None),
            ActionKind::Execute(spec) => (spec.path.connection(), None),
        }
    }

    /// Push every invalid field onto `errors`
    pub fn validate(&self, errors: &mut Errors) {
        let missing = |field| Error::MissingField {
            entity: self.kind.kind(),
            name: self.name.clone(),
            field,
        };

        if self.name.is_empty() {
            errors.push(missing("name"));
        }

        match &self.kind {
            ActionKind::Copy(spec) if spec.from.path.is_empty() => {
                errors.push(missing("From.path"));
            }
            ActionKind::Move(spec) => {
                if spec.from.path.is_empty() {
                    errors.push(missing("From.path"));
                }
                if let Some(to) = spec.to.connection()
                    && spec.from.connection() != Some(to)
                {
                    errors.push(Error::CrossTransportMove {
                        action: self.name.clone(),
                        from: spec.from.side().to_string(),
                        to: to.to_string(),
                    });
                }
            }
            ActionKind::Execute(spec) => {
                if spec.path.path.is_empty() {
                    errors.push(missing("Path.path"));
                }
                for entry in &spec.environment {
                    if split_environment(entry).is_none() {
                        errors.push(Error::InvalidEnvironment {
                            action: self.name.clone(),
                            entry: entry.clone(),
                        });
                    }
                }
            }
            ActionKind::Copy(_) => {}
        }
    }
}

/// First action with the given name
pub fn find(actions: &[Action], name: &str) -> Option<ActionId> {
    actions.iter().position(|action| action.name == name)
}
