//! Driving a non-blocking libssh2 session
//!
//! Sessions switch to non-blocking mode once authenticated, so a channel
//! waiting for output never holds the session lock other channels need.
//! Calls that can report EAGAIN go through [`retry`]; readers and writers
//! handed to the engine are wrapped in [`Blocking`].

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

/// `LIBSSH2_ERROR_EAGAIN`
const EAGAIN: i32 = -37;

/// Pause between attempts while libssh2 has nothing for us
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(2);

pub(crate) fn would_block(error: &ssh2::Error) -> bool {
    matches!(error.code(), ssh2::ErrorCode::Session(EAGAIN))
}

/// Repeat a libssh2 call until it stops asking to be called again
pub(crate) fn retry<T>(
    mut call: impl FnMut() -> Result<T, ssh2::Error>,
) -> Result<T, ssh2::Error> {
    loop {
        match call() {
            Err(e) if would_block(&e) => thread::sleep(POLL_INTERVAL),
            other => return other,
        }
    }
}

fn retry_io<T>(mut call: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match call() {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            other => return other,
        }
    }
}

/// Blocking `Read`/`Write` over a stream of a non-blocking session
pub(crate) struct Blocking<T>(pub T);

impl<T: Read> Read for Blocking<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        retry_io(|| self.0.read(buf))
    }
}

impl<T: Write> Write for Blocking<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        retry_io(|| self.0.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        retry_io(|| self.0.flush())
    }
}

/// Read everything currently available from a non-blocking reader
///
/// Returns whether any bytes arrived.
pub(crate) fn drain(reader: &mut impl Read, sink: &mut Vec<u8>) -> io::Result<bool> {
    let mut buf = [0u8; 8192];
    let mut progressed = false;
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Ok(progressed),
            Ok(n) => {
                sink.extend_from_slice(&buf[..n]);
                progressed = true;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(progressed),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}
