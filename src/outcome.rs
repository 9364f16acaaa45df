use std::fmt;

use crate::posix;

/// Exit code used by the child when the work returned without exiting on its own.
///
/// Work that calls `exit(122)` itself is indistinguishable from a clean return.
pub const NO_EXIT: u8 = 122;

/// Exit code used by the child when the work raised an error.
///
/// The error payload travels over a pipe; the exit code only tells the parent to read it.
pub const EXCEPTION_RAISED: u8 = 123;

/// Facts about how a child process ended, as reported by `waitpid()`.
#[derive(Debug, Default, Eq, PartialEq, Hash, Copy, Clone)]
pub struct RawTermination {
    /// True if the process called `exit` (or returned from `main`).
    pub exited: bool,
    /// The exit code, if the process exited.
    pub exit_code: Option<u32>,
    /// The signal that terminated the process, if any.
    pub signal: Option<i32>,
    /// True if the kernel wrote a core dump.
    pub core_dumped: bool,
}

impl RawTermination {
    /// A process that exited with `code`.
    pub fn exited(code: u32) -> RawTermination {
        RawTermination {
            exited: true,
            exit_code: Some(code),
            ..Default::default()
        }
    }

    /// A process terminated by `signal`.
    pub fn signaled(signal: i32, core_dumped: bool) -> RawTermination {
        RawTermination {
            signal: Some(signal),
            core_dumped,
            ..Default::default()
        }
    }

    /// A process known to have finished whose status is unavailable, e.g. because
    /// foreign code reaped it.
    pub fn undetermined() -> RawTermination {
        RawTermination::default()
    }
}

/// How an isolated unit of work ended.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone)]
pub enum Outcome {
    /// The work returned normally without exiting the process itself.
    Completed,

    /// The work explicitly exited the process with the given code.
    ///
    /// `Exited(0)` is a success, and fires `on_exit` alongside `on_success`.
    Exited(u32),

    /// The process was killed with `SIGKILL`, by the timeout or by someone else.
    Killed,

    /// The process aborted, crashed, or dumped core.
    Faulted {
        /// The terminating signal.
        signal: i32,
    },

    /// The process was terminated by a signal that is neither a kill nor a fault.
    Signaled(i32),

    /// The process finished, but its status could not be determined.
    Undetermined,
}

impl Outcome {
    /// True for a clean return and for an explicit `exit(0)`.
    pub fn success(&self) -> bool {
        matches!(self, Outcome::Completed | Outcome::Exited(0))
    }

    /// The caller-visible exit code: 0 for a clean return, the exit code for an
    /// explicit exit, and `None` for a process that did not exit.
    pub fn code(&self) -> Option<u32> {
        match *self {
            Outcome::Completed => Some(0),
            Outcome::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// True if the process was killed with `SIGKILL`.
    pub fn killed(&self) -> bool {
        matches!(self, Outcome::Killed)
    }

    /// True if the process aborted, crashed, or dumped core.
    pub fn faulted(&self) -> bool {
        matches!(self, Outcome::Faulted { .. })
    }

    /// The exit code if the work exited explicitly, even with zero.
    pub fn exit_code(&self) -> Option<u32> {
        match *self {
            Outcome::Exited(code) => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => write!(f, "completed"),
            Outcome::Exited(code) => write!(f, "exited with code {}", code),
            Outcome::Killed => write!(f, "killed"),
            Outcome::Faulted { signal } => write!(f, "faulted with signal {}", signal),
            Outcome::Signaled(signal) => write!(f, "terminated by signal {}", signal),
            Outcome::Undetermined => write!(f, "undetermined exit status"),
        }
    }
}

/// Interpret the termination of an isolated child.
///
/// The no-exit sentinel counts as a clean completion. A core dump is a fault whatever
/// the signal; `SIGABRT` and the synchronous fault signals (`SIGSEGV`, `SIGBUS`,
/// `SIGILL`, `SIGFPE`) are faults even without one.
pub fn classify(raw: &RawTermination) -> Outcome {
    if raw.exited {
        return match raw.exit_code {
            Some(code) if code == NO_EXIT as u32 => Outcome::Completed,
            Some(code) => Outcome::Exited(code),
            None => Outcome::Undetermined,
        };
    }
    match raw.signal {
        Some(signal) if posix::FAULT_SIGNALS.contains(&signal) || raw.core_dumped => {
            Outcome::Faulted { signal }
        }
        Some(signal) if signal == posix::SIGKILL => Outcome::Killed,
        Some(signal) => Outcome::Signaled(signal),
        None => Outcome::Undetermined,
    }
}
