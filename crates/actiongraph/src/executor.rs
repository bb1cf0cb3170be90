//! Execution engine - connects, then runs the action forest with fan-out/fan-in
//!
//! One coordinating thread owns all run state. Connections and actions each
//! get their own worker thread; workers only report back over a channel.

use crate::action::ActionId;
use crate::connection::Connection;
use crate::context::{ActionContext, NoObserver, Phase, RunObserver, Shutdown};
use crate::error::{Error, Errors, Result};
use crate::handler;
use crate::planner::Plan;
use crate::transport::{Connector, FileTransfer, LocalFs};
use crate::types::{ActionReport, ActionState, RunSummary};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// How often the connect phase checks for shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

type Completion = (ActionId, Result<()>);

/// Run a prepared plan
///
/// # Arguments
/// * `plan` - The prepared plan to run
/// * `connector` - Opens a session for each declared connection
/// * `shutdown` - Checked while connecting; once actions start it is ignored
/// * `observer` - Progress callback, called from this thread only
///
/// # Returns
/// The per-action summary when every action succeeded or the run was
/// interrupted while connecting. Otherwise the joined errors: every connect
/// failure, or every failed action (their dependents never run).
pub fn execute<O: RunObserver>(
    mut plan: Plan,
    connector: Arc<dyn Connector>,
    shutdown: &Shutdown,
    observer: &mut O,
) -> Result<RunSummary> {
    observer.on_phase(Phase::Connect);
    if !connect_all(&mut plan.connections, connector, shutdown)? {
        log::warn!("Shutdown requested while connecting, no action was run");
        let summary = RunSummary::interrupted(pending_reports(&plan));
        observer.on_finish(&summary);
        return Ok(summary);
    }

    observer.on_phase(Phase::Workspace);
    let workspace = WorkFolder::create(&plan.folder, plan.keep)?;

    observer.on_phase(Phase::Execute);
    let (reports, errors) = run_actions(&plan, observer);
    let summary = RunSummary::from_reports(reports);
    observer.on_finish(&summary);

    observer.on_phase(Phase::Cleanup);
    drop(workspace);

    log::info!(
        "Run finished: {} succeeded, {} failed, {} skipped",
        summary.succeeded,
        summary.failed,
        summary.skipped
    );
    errors.into_result()?;
    Ok(summary)
}

/// Run without shutdown handling or progress callbacks
pub fn execute_simple(plan: Plan, connector: Arc<dyn Connector>) -> Result<RunSummary> {
    execute(plan, connector, &Shutdown::new(), &mut NoObserver)
}

/// Open every connection in parallel
///
/// Returns `Ok(false)` when shutdown was requested first. Connect threads
/// still running at that point are detached.
fn connect_all(
    connections: &mut [Connection],
    connector: Arc<dyn Connector>,
    shutdown: &Shutdown,
) -> Result<bool> {
    if connections.is_empty() {
        return Ok(!shutdown.is_triggered());
    }
    log::info!("Connecting to {} host(s)", connections.len());

    let (tx, rx) = mpsc::channel();
    let mut outstanding = 0;
    let mut errors = Errors::new();
    for (id, connection) in connections.iter().enumerate() {
        let tx = tx.clone();
        let connector = Arc::clone(&connector);
        let credential = connection.credential.clone();
        let spawned = thread::Builder::new()
            .name(format!("connect-{}", connection.name))
            .spawn(move || {
                let result =
                    panic::catch_unwind(AssertUnwindSafe(|| connector.connect(&credential)))
                        .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(&*payload))));
                let _ = tx.send((id, result));
            });
        match spawned {
            Ok(_) => outstanding += 1,
            Err(e) => errors.push(Error::connect(&connection.name, Error::transport(e))),
        }
    }
    drop(tx);

    while outstanding > 0 {
        if shutdown.is_triggered() {
            return Ok(false);
        }
        let (id, result) = match rx.recv_timeout(SHUTDOWN_POLL) {
            Ok(received) => received,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        outstanding -= 1;
        let connection = &mut connections[id];
        match result {
            Ok(session) => {
                log::info!("Connected to '{}' ({})", connection.name, connection.credential);
                connection.attach(session);
            }
            Err(e) => errors.push(Error::connect(&connection.name, e)),
        }
    }

    errors.into_result()?;
    Ok(!shutdown.is_triggered())
}

/// The work folder of a run, removed on drop unless kept
struct WorkFolder<'a> {
    path: &'a Path,
    keep: bool,
}

impl<'a> WorkFolder<'a> {
    fn create(path: &'a Path, keep: bool) -> Result<Self> {
        LocalFs
            .create_dir_all(path)
            .map_err(|e| Error::io(path, e))?;
        log::debug!("Work folder ready at {}", path.display());
        Ok(Self { path, keep })
    }
}

impl Drop for WorkFolder<'_> {
    fn drop(&mut self) {
        if self.keep {
            log::info!("Keeping work folder {}", self.path.display());
            return;
        }
        match LocalFs.remove_all(self.path) {
            Ok(()) => log::debug!("Removed work folder {}", self.path.display()),
            Err(e) => log::warn!(
                "Failed to remove work folder {}: {e}",
                self.path.display()
            ),
        }
    }
}

/// Dispatch roots, then dependents of every success, until nothing is outstanding
fn run_actions<O: RunObserver>(plan: &Plan, observer: &mut O) -> (Vec<ActionReport>, Errors) {
    let ctx = ActionContext::new(&plan.folder, &plan.connections);
    let ctx = &ctx;
    let mut reports = pending_reports(plan);
    let mut errors = Errors::new();

    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel::<Completion>();
        let mut outstanding = 0usize;

        let dispatch = |id: ActionId, reports: &mut [ActionReport], observer: &mut O| {
            let action = plan.action(id);
            observer.on_dispatch(action);
            reports[id].state = ActionState::Dispatched;
            log::debug!("Dispatching '{}': {}", action.name, action.kind.describe());

            let worker_tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("action-{}", action.name))
                .spawn_scoped(scope, move || {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| {
                        handler::process(action, ctx)
                    }))
                    .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(&*payload))));
                    let _ = worker_tx.send((id, result));
                });
            if let Err(e) = spawned {
                let error = Error::transport(format!("failed to spawn worker: {e}"));
                let _ = tx.send((id, Err(error)));
            }
        };

        for &root in plan.roots() {
            dispatch(root, &mut reports, observer);
            outstanding += 1;
        }

        while outstanding > 0 {
            let Ok((id, result)) = rx.recv() else {
                break;
            };
            outstanding -= 1;

            let action = plan.action(id);
            observer.on_complete(action, &result);
            match result {
                Ok(()) => {
                    log::debug!("Action '{}' succeeded", action.name);
                    reports[id].state = ActionState::Succeeded;
                    for &dependent in action.dependents() {
                        dispatch(dependent, &mut reports, observer);
                        outstanding += 1;
                    }
                }
                Err(e) => {
                    log::debug!("Action '{}' failed: {e}", action.name);
                    reports[id].state = ActionState::Failed;
                    reports[id].error = Some(e.to_string());
                    errors.push(Error::action(&action.name, e));
                }
            }
        }
    });

    (reports, errors)
}

fn pending_reports(plan: &Plan) -> Vec<ActionReport> {
    plan.actions()
        .iter()
        .map(|action| ActionReport {
            name: action.name.clone(),
            state: ActionState::Pending,
            error: None,
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
