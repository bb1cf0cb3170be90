//! Command execution over an open session
//!
//! The session is non-blocking, so a command waiting for output never holds
//! the lock that SFTP transfers and other commands on the same connection
//! need. Stdout and stderr are drained together to keep either from filling
//! its window while the other is read.

use crate::error::Error;
use crate::nonblocking::{POLL_INTERVAL, drain, retry};
use crate::sftp::SftpTransfer;
use actiongraph::{CommandOutput, CommandRequest, FileTransfer, Session};
use std::thread;
use std::time::{Duration, Instant};

/// An authenticated libssh2 session shared by every action on one connection
pub struct SshSession {
    session: ssh2::Session,
    /// `user@host:port`, for logs
    label: String,
}

impl SshSession {
    /// Wrap a session that has been authenticated and set non-blocking
    pub fn new(session: ssh2::Session, label: String) -> Self {
        Self { session, label }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn run(&self, command: &str, deadline: Option<Duration>) -> crate::Result<CommandOutput> {
        let started = Instant::now();
        let mut channel =
            retry(|| self.session.channel_session()).map_err(Error::ssh("open channel"))?;
        retry(|| channel.exec(command)).map_err(Error::ssh("exec"))?;

        let mut stdout_stream = channel.stream(0);
        let mut stderr_stream = channel.stderr();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        loop {
            let read_out = drain(&mut stdout_stream, &mut stdout).map_err(|source| Error::Io {
                context: "read stdout",
                source,
            })?;
            let read_err = drain(&mut stderr_stream, &mut stderr).map_err(|source| Error::Io {
                context: "read stderr",
                source,
            })?;
            if channel.eof() {
                break;
            }
            if let Some(limit) = deadline
                && started.elapsed() >= limit
            {
                log::debug!("Closing channel for timed out command on {}", self.label);
                if let Err(e) = retry(|| channel.close()) {
                    log::warn!("Failed to close channel on {}: {e}", self.label);
                }
                return Err(Error::Timeout {
                    seconds: limit.as_secs(),
                });
            }
            if !read_out && !read_err {
                thread::sleep(POLL_INTERVAL);
            }
        }

        retry(|| channel.wait_close()).map_err(Error::ssh("close channel"))?;
        let status = channel.exit_status().map_err(Error::ssh("exit status"))?;
        let signal = channel.exit_signal().ok().and_then(|exit| exit.exit_signal);
        if let Some(signal) = &signal {
            log::debug!("Remote command on {} killed by SIG{signal}", self.label);
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            code: if signal.is_some() { None } else { Some(status) },
        })
    }
}

impl Session for SshSession {
    fn exec(
        &self,
        request: &CommandRequest,
        deadline: Option<Duration>,
    ) -> actiongraph::Result<CommandOutput> {
        let command = request.command_line();
        log::debug!("[{}] $ {command}", self.label);
        Ok(self.run(&command, deadline)?)
    }

    fn file_transfer(&self) -> actiongraph::Result<Box<dyn FileTransfer + '_>> {
        let sftp = retry(|| self.session.sftp()).map_err(Error::ssh("open sftp"))?;
        log::debug!("Opened SFTP channel to {}", self.label);
        Ok(Box::new(SftpTransfer::new(sftp)))
    }
}
