//! Run context and observer traits
//!
//! These let the engine be driven without depending on a particular UI or
//! signal-handling implementation.

use crate::action::Action;
use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::transport::Session;
use crate::types::RunSummary;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shutdown request shared between a signal handler and the engine
///
/// Honoured only while connections are being opened; once actions start,
/// they run to completion.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Phases of a run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Workspace,
    Execute,
    Cleanup,
}

/// Receives progress updates from the coordinating thread
pub trait RunObserver {
    /// Called when a phase begins
    fn on_phase(&mut self, phase: Phase);

    /// Called when an action is handed to a worker thread
    fn on_dispatch(&mut self, action: &Action);

    /// Called when an action's result arrives
    fn on_complete(&mut self, action: &Action, result: &Result<()>);

    /// Called once with the final per-action states, before the work folder is removed
    fn on_finish(&mut self, summary: &RunSummary);
}

/// No-op observer
pub struct NoObserver;

impl RunObserver for NoObserver {
    fn on_phase(&mut self, _phase: Phase) {}
    fn on_dispatch(&mut self, _action: &Action) {}
    fn on_complete(&mut self, _action: &Action, _result: &Result<()>) {}
    fn on_finish(&mut self, _summary: &RunSummary) {}
}

/// What an action handler may see of the run
pub struct ActionContext<'a> {
    /// Work folder of the run
    pub folder: &'a Path,
    connections: &'a [Connection],
}

impl<'a> ActionContext<'a> {
    pub fn new(folder: &'a Path, connections: &'a [Connection]) -> Self {
        Self {
            folder,
            connections,
        }
    }

    /// Session for a resolved connection, `None` for local
    pub fn session(&self, id: Option<ConnectionId>) -> Result<Option<&'a Arc<dyn Session>>> {
        let Some(id) = id else {
            return Ok(None);
        };
        let connection = self
            .connections
            .get(id)
            .ok_or_else(|| Error::transport(format!("no connection at index {id}")))?;
        connection.session().map(Some).ok_or_else(|| {
            Error::transport(format!("connection '{}' is not connected", connection.name))
        })
    }
}
