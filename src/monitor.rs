//! The parent side of an isolation call: fork, wait, collect the error payload.

use std::cmp::min;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::builder::{ErrorOutput, WorkResult};
use crate::child;
use crate::error::Error;
use crate::marshal;
use crate::outcome::{EXCEPTION_RAISED, RawTermination};
use crate::posix;
use crate::process::Child;

const MAX_DELAY: Duration = Duration::from_millis(100);

/// Read end of the pipe over which the child sends its error payload.
///
/// The descriptor is non-blocking: the monitor reads whatever is available between
/// polls of the child, so a payload larger than the pipe buffer never leaves the child
/// blocked in `write` while the parent waits for it to exit.
struct ErrorPipe {
    file: Option<File>,
    payload: Vec<u8>,
}

impl ErrorPipe {
    fn new(file: File) -> ErrorPipe {
        ErrorPipe {
            file: Some(file),
            payload: Vec::new(),
        }
    }

    /// True until the write end has been closed by everyone holding it.
    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Read everything currently available.
    fn drain(&mut self) -> io::Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };
        let mut buf = [0u8; 8192];
        loop {
            match file.read(&mut buf) {
                Ok(0) => {
                    self.file = None;
                    return Ok(());
                }
                Ok(n) => self.payload.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Wait up to `timeout` for the pipe to become readable, then drain it.
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<()> {
        let Some(file) = self.file.as_ref() else {
            thread::sleep(timeout);
            return Ok(());
        };
        let mut fds = [posix::PollFd::new(file.as_raw_fd(), posix::POLLIN)];
        posix::poll(&mut fds, Some(timeout))?;
        if fds[0].test(posix::POLLIN | posix::POLLHUP | posix::POLLERR | posix::POLLNVAL) {
            self.drain()?;
        }
        Ok(())
    }

    /// Collect what is left and close the pipe.
    ///
    /// Only called after the child has been reaped, so everything it wrote is already
    /// buffered in the pipe.
    fn finish(mut self) -> io::Result<Vec<u8>> {
        self.drain()?;
        Ok(self.payload)
    }
}

/// Run `work` in a forked child and wait for it to terminate.
///
/// Returns the child's termination status, or [`Error::Work`] if the work returned an
/// error or panicked.
pub(crate) fn run<F, R>(
    stderr: &ErrorOutput,
    timeout: Option<Duration>,
    work: F,
) -> Result<RawTermination, Error<R::Error>>
where
    F: FnOnce() -> R,
    R: WorkResult,
{
    let stderr_file = stderr.open()?;
    let (read_end, write_end) = posix::pipe()?;
    posix::set_cloexec(&read_end)?;
    posix::set_cloexec(&write_end)?;
    posix::set_nonblocking(&read_end)?;

    // Output still buffered at fork time would otherwise be flushed twice.
    let _ = io::stdout().flush();

    let pid = match unsafe { posix::fork()? } {
        Some(pid) => pid,
        None => {
            drop(read_end);
            child::run(work, stderr_file, write_end)
        }
    };

    // The child holds the only write end from now on, so reads see EOF once it is
    // gone.
    drop(write_end);
    drop(stderr_file);

    let mut child = Child::new(pid);
    let mut pipe = ErrorPipe::new(read_end);
    debug!(pid, ?timeout, "forked isolated child");

    let (reaped, status) = wait(&mut child, &mut pipe, timeout)?;
    if reaped != child.pid() {
        return Err(Error::WrongChild {
            expected: child.pid(),
            actual: reaped,
        });
    }
    debug!(pid, ?status, "reaped isolated child");

    let payload = pipe.finish()?;
    if status.exited && status.exit_code == Some(EXCEPTION_RAISED as u32) {
        if payload.is_empty() {
            warn!(
                pid,
                "child exited with code {} but sent no error payload", EXCEPTION_RAISED
            );
            return Ok(status);
        }
        let error = marshal::decode(&payload).map_err(|e| Error::Payload(e.to_string()))?;
        return Err(Error::Work(error));
    }
    Ok(status)
}

/// Wait for `child` to terminate, killing it once `timeout` has elapsed.
///
/// Polls with exponential back-off, spending the pauses in `poll()` on the error pipe
/// so that the payload is drained as it arrives.
fn wait(
    child: &mut Child,
    pipe: &mut ErrorPipe,
    timeout: Option<Duration>,
) -> io::Result<(u32, RawTermination)> {
    // A deadline past the end of representable time is no deadline at all.
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let mut delay = Duration::from_millis(1);

    loop {
        if let Some(reaped) = child.try_wait()? {
            return Ok(reaped);
        }
        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    debug!(pid = child.pid(), "timeout elapsed, killing isolated child");
                    child.kill()?;
                    return child.wait();
                }
                min(delay, deadline.duration_since(now))
            }
            // Nothing left to drain and nothing to time out: just block.
            None if !pipe.is_open() => return child.wait(),
            None => delay,
        };
        pipe.wait_readable(pause)?;
        delay = min(delay * 2, MAX_DELAY);
    }
}
