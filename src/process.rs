use std::fmt;
use std::io;

use crate::outcome::RawTermination;
use crate::posix;

/// A handle to a forked child process.
///
/// The waiting methods return the pid reported by `waitpid()` along with the status, so
/// that the caller can check it against [`pid`](Self::pid).
///
/// # Drop behavior
///
/// If the child has not been reaped when the handle is dropped, it is killed and then
/// waited for, so that an early return from the monitor never leaves a zombie or an
/// orphan behind.
pub(crate) struct Child {
    pid: u32,
    state: ProcessState,
}

#[derive(Debug, Copy, Clone)]
enum ProcessState {
    Running,
    Finished(RawTermination),
}

impl Child {
    pub fn new(pid: u32) -> Child {
        Child {
            pid,
            state: ProcessState::Running,
        }
    }

    /// Returns the PID of the child.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Check whether the child has finished, without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<(u32, RawTermination)>> {
        self.waitpid(posix::WNOHANG)
    }

    /// Wait for the child to finish.
    pub fn wait(&mut self) -> io::Result<(u32, RawTermination)> {
        loop {
            match self.waitpid(0) {
                Ok(Some(reaped)) => return Ok(reaped),
                Ok(None) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Send `SIGKILL` to the child.
    ///
    /// Does nothing if the child is known to have finished. A child that disappeared in
    /// the meantime (`ESRCH`) is not an error: it exited on its own just before the
    /// signal was sent.
    pub fn kill(&self) -> io::Result<()> {
        if let ProcessState::Finished(_) = self.state {
            return Ok(());
        }
        match posix::kill(self.pid, posix::SIGKILL) {
            Err(e) if e.raw_os_error() == Some(posix::ESRCH) => Ok(()),
            result => result,
        }
    }

    fn waitpid(&mut self, flags: i32) -> io::Result<Option<(u32, RawTermination)>> {
        if let ProcessState::Finished(status) = self.state {
            return Ok(Some((self.pid, status)));
        }
        match posix::waitpid(self.pid, flags) {
            Ok((0, _)) => Ok(None),
            Ok((pid_out, status)) => {
                if pid_out == self.pid {
                    self.state = ProcessState::Finished(status);
                }
                Ok(Some((pid_out, status)))
            }
            Err(e) if e.raw_os_error() == Some(posix::ECHILD) => {
                // Someone else waited for the child. The PID no longer exists and we
                // cannot find its exit status.
                let status = RawTermination::undetermined();
                self.state = ProcessState::Finished(status);
                Ok(Some((self.pid, status)))
            }
            Err(e) => Err(e),
        }
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        if let ProcessState::Running = self.state {
            let _ = self.kill();
            let _ = self.wait();
        }
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Child")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .finish()
    }
}
