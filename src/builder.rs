use std::convert::Infallible;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::Error;
use crate::hooks::Hooks;
use crate::marshal::Marshal;
use crate::monitor;
use crate::outcome::{self, Outcome};

const NULL_DEVICE: &str = "/dev/null";

/// What to do with the child's standard error while the work runs.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum ErrorOutput {
    /// Discard it by pointing it at `/dev/null`.
    ///
    /// This is the default.
    #[default]
    Null,

    /// Write it to the file at the given path, created or truncated before the child
    /// starts.
    Path(PathBuf),

    /// Leave it alone; the child shares the parent's stderr.
    Inherit,
}

impl ErrorOutput {
    pub(crate) fn open(&self) -> io::Result<Option<File>> {
        Ok(match self {
            ErrorOutput::Null => Some(OpenOptions::new().write(true).open(NULL_DEVICE)?),
            ErrorOutput::Path(path) => Some(File::create(path)?),
            ErrorOutput::Inherit => None,
        })
    }
}

impl From<PathBuf> for ErrorOutput {
    fn from(path: PathBuf) -> Self {
        ErrorOutput::Path(path)
    }
}

impl From<&Path> for ErrorOutput {
    fn from(path: &Path) -> Self {
        ErrorOutput::Path(path.to_owned())
    }
}

/// Return values accepted from isolated work.
///
/// Implemented for `()`, for work that cannot fail, and for `Result<(), E>` where the
/// error can be marshalled back to the parent.
pub trait WorkResult {
    /// The error type sent back to the parent.
    type Error: Marshal;

    /// Convert into a `Result`.
    fn into_result(self) -> Result<(), Self::Error>;
}

impl WorkResult for () {
    type Error = Infallible;

    fn into_result(self) -> Result<(), Infallible> {
        Ok(())
    }
}

impl<E: Marshal> WorkResult for Result<(), E> {
    type Error = E;

    fn into_result(self) -> Result<(), E> {
        self
    }
}

/// A builder for running work in an isolated child process.
///
/// # Examples
///
/// ```no_run
/// # use isolate::*;
/// # use std::time::Duration;
/// let outcome = Isolate::new()
///     .timeout(Duration::from_secs(10))
///     .on_kill(|| eprintln!("timed out"))
///     .on_exit(|code| eprintln!("exited with {}", code))
///     .run(|| {
///         // runs in the child
///     })?;
/// assert!(outcome.success());
/// # Ok::<(), isolate::Error<std::convert::Infallible>>(())
/// ```
///
/// Errors returned by the work come back as [`Error::Work`]:
///
/// ```no_run
/// # use isolate::*;
/// let result = Isolate::new().run(|| -> std::result::Result<(), String> { Err("bad input".into()) });
/// match result {
///     Err(Error::Work(e)) => assert_eq!(e.message(), "bad input"),
///     _ => unreachable!(),
/// }
/// ```
///
/// Callbacks are `FnOnce` closures that may borrow from the caller; they run in the
/// parent after the child has been reaped, and only if the work did not return an
/// error.
#[must_use]
pub struct Isolate<'a> {
    stderr: ErrorOutput,
    timeout: Option<Duration>,
    hooks: Hooks<'a>,
}

impl<'a> Isolate<'a> {
    /// Create a builder with default options: stderr discarded, no timeout, no callbacks.
    pub fn new() -> Isolate<'a> {
        Isolate {
            stderr: ErrorOutput::default(),
            timeout: None,
            hooks: Hooks::default(),
        }
    }

    /// Specify what to do with the child's standard error.
    pub fn stderr(mut self, stderr: impl Into<ErrorOutput>) -> Isolate<'a> {
        self.stderr = stderr.into();
        self
    }

    /// Kill the child with `SIGKILL` if it has not finished after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Isolate<'a> {
        self.timeout = Some(timeout);
        self
    }

    /// Call `f(success, code)` after the child has finished, however it finished.
    ///
    /// This runs after all other callbacks. `code` is 0 for a clean return, the exit
    /// code for an explicit exit, and `None` if the child was terminated by a signal.
    pub fn on_finish(mut self, f: impl FnOnce(bool, Option<u32>) + 'a) -> Isolate<'a> {
        self.hooks.on_finish = Some(Box::new(f));
        self
    }

    /// Call `f()` if the work returned normally or exited with code 0.
    pub fn on_success(mut self, f: impl FnOnce() + 'a) -> Isolate<'a> {
        self.hooks.on_success = Some(Box::new(f));
        self
    }

    /// Call `f()` if the child was killed with `SIGKILL`.
    pub fn on_kill(mut self, f: impl FnOnce() + 'a) -> Isolate<'a> {
        self.hooks.on_kill = Some(Box::new(f));
        self
    }

    /// Call `f()` if the child aborted, crashed, or dumped core.
    pub fn on_fault(mut self, f: impl FnOnce() + 'a) -> Isolate<'a> {
        self.hooks.on_fault = Some(Box::new(f));
        self
    }

    /// Call `f(code)` if the work explicitly exited the process, with any code
    /// including 0.
    pub fn on_exit(mut self, f: impl FnOnce(u32) + 'a) -> Isolate<'a> {
        self.hooks.on_exit = Some(Box::new(f));
        self
    }

    /// Run `work` in a forked child process and wait for it.
    ///
    /// Returns the classified outcome after firing the matching callbacks. If the work
    /// returned an error or panicked, the reconstructed error is returned as
    /// [`Error::Work`] and no callbacks fire.
    ///
    /// Exit codes [`NO_EXIT`](crate::NO_EXIT) and
    /// [`EXCEPTION_RAISED`](crate::EXCEPTION_RAISED) are reserved; work that exits
    /// with them itself is misreported.
    pub fn run<F, R>(self, work: F) -> Result<Outcome, Error<R::Error>>
    where
        F: FnOnce() -> R,
        R: WorkResult,
    {
        let Isolate {
            stderr,
            timeout,
            hooks,
        } = self;
        let status = monitor::run(&stderr, timeout, work)?;
        let outcome = outcome::classify(&status);
        debug!(%outcome, "isolated work finished");
        hooks.dispatch(&outcome);
        Ok(outcome)
    }
}

impl Default for Isolate<'_> {
    fn default() -> Self {
        Isolate::new()
    }
}

impl fmt::Debug for Isolate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Isolate")
            .field("stderr", &self.stderr)
            .field("timeout", &self.timeout)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Run `work` in a forked child process with default options.
///
/// Shorthand for `Isolate::new().run(work)`.
pub fn isolate<F, R>(work: F) -> Result<Outcome, Error<R::Error>>
where
    F: FnOnce() -> R,
    R: WorkResult,
{
    Isolate::new().run(work)
}
