//! Graph builder - turns a deploy descriptor into a runnable plan

use crate::action::{self, Action, ActionId, Binding};
use crate::connection::{self, Connection, ConnectionId};
use crate::error::{Error, Errors, Result};
use std::fmt;
use std::path::PathBuf;

/// A deploy as described by the user
#[derive(Debug, Default)]
pub struct Deploy {
    /// Work folder, created for the run
    pub folder: PathBuf,
    /// Keep the work folder after the run
    pub keep: bool,
    pub connections: Vec<Connection>,
    pub actions: Vec<Action>,
}

/// A validated deploy with every reference resolved
#[derive(Debug)]
pub struct Plan {
    pub(crate) folder: PathBuf,
    pub(crate) keep: bool,
    pub(crate) connections: Vec<Connection>,
    pub(crate) actions: Vec<Action>,
    pub(crate) roots: Vec<ActionId>,
}

impl Deploy {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Default::default()
        }
    }

    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Check required fields, collecting every failure
    pub fn validate(&self) -> Result<()> {
        let mut errors = Errors::new();
        self.validate_into(&mut errors);
        errors.into_result()
    }

    fn validate_into(&self, errors: &mut Errors) {
        if self.folder.as_os_str().is_empty() {
            errors.push(Error::FolderEmpty);
        }
        for connection in &self.connections {
            connection.validate(errors);
        }
        for action in &self.actions {
            action.validate(errors);
        }
    }

    /// Validate, resolve references and build the dependency forest
    ///
    /// Every validation and resolution error is collected before failing.
    /// Actions without a `follow` become roots in declaration order.
    pub fn prepare(self) -> Result<Plan> {
        let mut errors = Errors::new();
        self.validate_into(&mut errors);

        let Deploy {
            folder,
            keep,
            connections,
            mut actions,
        } = self;

        for action in &mut actions {
            let (source, target) = action.connection_refs();
            let mut resolve = |name: Option<&str>| -> Option<ConnectionId> {
                let name = name?;
                let found = connection::find(&connections, name);
                if found.is_none() {
                    errors.push(Error::UnknownConnection {
                        action: action.name.clone(),
                        connection: name.to_string(),
                    });
                }
                found
            };
            let binding = Binding {
                source: resolve(source),
                target: resolve(target),
            };
            action.binding = binding;
        }

        let parents = resolve_follows(&actions, &mut errors);
        if let Some(cycle) = find_cycle(&actions, &parents) {
            errors.push(Error::DependencyCycle(cycle));
        }

        errors.into_result()?;

        let mut roots = Vec::new();
        for (id, parent) in parents.iter().enumerate() {
            match parent {
                Some(parent) => actions[*parent].dependents.push(id),
                None => roots.push(id),
            }
        }

        log::debug!(
            "Prepared {} actions ({} roots) across {} connections",
            actions.len(),
            roots.len(),
            connections.len()
        );

        Ok(Plan {
            folder,
            keep,
            connections,
            actions,
            roots,
        })
    }
}

/// Resolve each action's `follow` to the first action with that name
fn resolve_follows(actions: &[Action], errors: &mut Errors) -> Vec<Option<ActionId>> {
    let mut parents = Vec::with_capacity(actions.len());
    for current in actions {
        let Some(follow) = current.follows() else {
            parents.push(None);
            continue;
        };
        match action::find(actions, follow) {
            Some(parent) => {
                if actions.iter().filter(|a| a.name == follow).count() > 1 {
                    log::warn!(
                        "Action '{}' follows '{}', which is declared more than once; using the first",
                        current.name,
                        follow
                    );
                }
                parents.push(Some(parent));
            }
            None => {
                errors.push(Error::UnknownFollow {
                    action: current.name.clone(),
                    follow: follow.to_string(),
                });
                parents.push(None);
            }
        }
    }
    parents
}

/// Find a loop in the follow references, returned as the names along it
///
/// Each action has at most one parent, so walking parent links from every
/// action either reaches a root or revisits an action on the current walk.
fn find_cycle(actions: &[Action], parents: &[Option<ActionId>]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        OnWalk,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; actions.len()];
    for start in 0..actions.len() {
        let mut walk: Vec<ActionId> = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            match marks[id] {
                Mark::Done => break,
                Mark::OnWalk => {
                    let from = walk.iter().position(|&w| w == id).unwrap_or(0);
                    let mut names: Vec<String> = walk[from..]
                        .iter()
                        .map(|&w| actions[w].name.clone())
                        .collect();
                    names.push(actions[id].name.clone());
                    return Some(names);
                }
                Mark::Unvisited => {
                    marks[id] = Mark::OnWalk;
                    walk.push(id);
                    current = parents[id];
                }
            }
        }
        for id in walk {
            marks[id] = Mark::Done;
        }
    }
    None
}

impl Plan {
    pub fn folder(&self) -> &std::path::Path {
        &self.folder
    }

    pub fn keeps_folder(&self) -> bool {
        self.keep
    }

    /// Actions with no prerequisite, in declaration order
    pub fn roots(&self) -> &[ActionId] {
        &self.roots
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, id: ActionId) -> &Action {
        &self.actions[id]
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Total number of actions in the plan
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, id: ActionId, depth: usize) -> fmt::Result {
        let action = &self.actions[id];
        writeln!(
            f,
            "{}{}: {}",
            "  ".repeat(depth),
            action.name,
            action.kind.describe()
        )?;
        for &dependent in &action.dependents {
            self.write_tree(f, dependent, depth + 1)?;
        }
        Ok(())
    }
}

/// Renders the dependency forest, one action per line, dependents indented
impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &root in &self.roots {
            self.write_tree(f, root, 0)?;
        }
        Ok(())
    }
}
