//! Execute handler
//!
//! Output is buffered while the command runs and written to our own
//! stdout/stderr once it finishes, so concurrent actions never interleave
//! within one command's output.

use crate::action::Binding;
use crate::context::ActionContext;
use crate::error::{Error, Result};
use crate::transport::{CommandRequest, Session};
use crate::types::{CommandOutput, ExecuteSpec};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub(super) fn run(spec: &ExecuteSpec, binding: Binding, ctx: &ActionContext<'_>) -> Result<()> {
    let program = &spec.path.path;
    let output = match ctx.session(binding.source)? {
        Some(session) => run_remote(session, spec)?,
        None => run_local(spec)?,
    };

    write_output(&output);

    if output.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            program: program.clone(),
            code: output.code,
        })
    }
}

fn deadline(spec: &ExecuteSpec) -> Option<Duration> {
    (spec.timeout > 0).then(|| Duration::from_secs(spec.timeout))
}

/// Find the program: `PATH` lookup for bare names, the working directory otherwise
fn resolve_program(program: &str) -> Result<PathBuf> {
    if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
        let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
        return Ok(cwd.join(program));
    }
    which::which(program).map_err(|_| Error::ProgramNotFound {
        program: program.to_string(),
    })
}

fn run_local(spec: &ExecuteSpec) -> Result<CommandOutput> {
    let program = resolve_program(&spec.path.path)?;
    log::debug!("Running {} {:?}", program.display(), spec.args);

    let mut child = Command::new(&program)
        .args(&spec.args)
        .envs(spec.environment_pairs())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::io(&program, e))?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = match deadline(spec) {
        Some(limit) => wait_until(&mut child, limit, spec.timeout, &program)?,
        None => child.wait().map_err(|e| Error::io(&program, e))?,
    };

    Ok(CommandOutput {
        stdout: collect(stdout),
        stderr: collect(stderr),
        code: status.code(),
    })
}

/// Poll the child until it exits or `limit` passes
///
/// On timeout the child is killed and reaped; any grandchildren keeping the
/// pipes open are left to the reader threads, which are never joined.
fn wait_until(
    child: &mut Child,
    limit: Duration,
    seconds: u64,
    program: &Path,
) -> Result<ExitStatus> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|e| Error::io(program, e))? {
            return Ok(status);
        }
        if started.elapsed() >= limit {
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill timed out process {}: {e}", child.id());
            }
            let _ = child.wait();
            return Err(Error::Timeout { seconds });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        buffer
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Run the command over the session, which enforces the deadline itself
fn run_remote(session: &Arc<dyn Session>, spec: &ExecuteSpec) -> Result<CommandOutput> {
    let request = CommandRequest {
        program: spec.path.path.clone(),
        args: spec.args.clone(),
        environment: spec.environment_pairs(),
    };
    log::debug!("Running remote command: {}", request.command_line());
    session.exec(&request, deadline(spec))
}

fn write_output(output: &CommandOutput) {
    if !output.stdout.is_empty() {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(&output.stdout);
        let _ = stdout.flush();
    }
    if !output.stderr.is_empty() {
        let mut stderr = io::stderr().lock();
        let _ = stderr.write_all(&output.stderr);
        let _ = stderr.flush();
    }
}
