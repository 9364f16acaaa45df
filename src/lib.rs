//! Run a closure in a forked child process and find out how it ended.
//!
//! [`Isolate`] forks the current process, runs the supplied work in the child, and waits
//! for the child to terminate. The termination is classified into an [`Outcome`]:
//!
//! * [`Outcome::Completed`] - the work returned normally;
//! * [`Outcome::Exited`] - the work called `exit` itself, with the given code;
//! * [`Outcome::Killed`] - the child was killed with `SIGKILL`, for example by the
//!   timeout;
//! * [`Outcome::Faulted`] - the child aborted, crashed, or dumped core;
//! * [`Outcome::Signaled`] - the child was terminated by some other signal.
//!
//! Callbacks registered with the builder fire for the matching outcome, in a fixed
//! order. If the work returns an error or panics, the error is sent back to the parent
//! over a pipe and returned from [`Isolate::run`] as [`Error::Work`], as if the work
//! had run locally; see [`Marshal`] for how error types cross the process boundary.
//!
//! ```no_run
//! use std::time::Duration;
//! use isolate::{Isolate, Outcome};
//!
//! let outcome = Isolate::new()
//!     .stderr(std::path::Path::new("child.err"))
//!     .timeout(Duration::from_secs(5))
//!     .on_fault(|| eprintln!("the child crashed"))
//!     .on_finish(|success, code| eprintln!("done: {} {:?}", success, code))
//!     .run(|| {
//!         // something that might crash the process
//!     })?;
//! assert_eq!(outcome, Outcome::Completed);
//! # Ok::<(), isolate::Error<std::convert::Infallible>>(())
//! ```
//!
//! Isolation calls nest: work running in a child may itself use [`Isolate`].
//!
//! The child exits with the reserved codes [`NO_EXIT`] and [`EXCEPTION_RAISED`] to tell
//! the parent what happened. Work that exits with one of those codes itself will be
//! misreported.
//!
//! Only the calling thread is duplicated by `fork()`. Work must not rely on locks that
//! other threads of the parent could have held at the time of the call.

#![cfg(unix)]

mod builder;
mod child;
mod error;
mod hooks;
pub mod marshal;
mod monitor;
mod outcome;
mod posix;
mod process;

pub use builder::{ErrorOutput, Isolate, WorkResult, isolate};
pub use error::{Error, Result};
pub use marshal::{Marshal, MarshalError, RemoteError, WorkError, from_json, to_json};
pub use outcome::{EXCEPTION_RAISED, NO_EXIT, Outcome, RawTermination, classify};

#[cfg(test)]
mod tests;
