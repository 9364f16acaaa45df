use std::io;

use thiserror::Error;

use crate::marshal::WorkError;

/// Errors returned by [`Isolate::run`](crate::Isolate::run).
///
/// `E` is the error type of the isolated work. Terminations that are not errors raised
/// by the work (exits, kills, faults) are reported through the returned
/// [`Outcome`](crate::Outcome) and the callbacks, never through this type.
#[derive(Debug, Error)]
pub enum Error<E> {
    /// The work returned an error or panicked in the child.
    #[error("{0}")]
    Work(WorkError<E>),

    /// A system call needed to start or monitor the child failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// `waitpid()` reported a different process than the one that was forked.
    ///
    /// This indicates a bug and should never happen.
    #[error("wrong child reaped: expected pid {expected}, got {actual}")]
    WrongChild {
        /// The pid of the forked child.
        expected: u32,
        /// The pid reported by `waitpid()`.
        actual: u32,
    },

    /// The child's error payload could not be decoded.
    #[error("malformed error payload: {0}")]
    Payload(String),
}

impl<E> Error<E> {
    /// The work's error, if this is [`Error::Work`].
    pub fn into_work(self) -> Option<WorkError<E>> {
        match self {
            Error::Work(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of an isolation call whose work fails with `E`.
pub type Result<T, E> = std::result::Result<T, Error<E>>;
