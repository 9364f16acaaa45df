//! The part of an isolation call that runs in the forked child.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::panic::{self, AssertUnwindSafe};

use crate::builder::WorkResult;
use crate::marshal;
use crate::outcome::{EXCEPTION_RAISED, NO_EXIT};
use crate::posix;

const STDERR_FD: i32 = 2;

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Points fd 2 at another file for as long as it lives.
///
/// The original stderr is kept open as a duplicate and put back on drop.
struct StderrRedirect {
    saved: File,
}

impl StderrRedirect {
    fn new(target: &File) -> io::Result<StderrRedirect> {
        let saved = posix::dup(STDERR_FD)?;
        posix::dup2(target.as_raw_fd(), STDERR_FD)?;
        Ok(StderrRedirect { saved })
    }
}

impl Drop for StderrRedirect {
    fn drop(&mut self) {
        let _ = posix::dup2(self.saved.as_raw_fd(), STDERR_FD);
    }
}

/// Run `work` and terminate the process with a code describing how it went.
///
/// `stderr`, if given, replaces the child's stderr while the work runs. An error
/// returned by the work, or a panic, is written to `pipe` before exiting with
/// [`EXCEPTION_RAISED`]; normal completion exits with [`NO_EXIT`]. The exit goes
/// through `_exit`, so `atexit` handlers registered by the work do not run twice.
pub(crate) fn run<F, R>(work: F, stderr: Option<File>, pipe: File) -> !
where
    F: FnOnce() -> R,
    R: WorkResult,
{
    // Nothing may unwind out of here: the stack above belongs to the parent's caller.
    let code = panic::catch_unwind(AssertUnwindSafe(|| execute(work, stderr, pipe)))
        .unwrap_or(EXCEPTION_RAISED);
    terminate(code)
}

fn execute<F, R>(work: F, stderr: Option<File>, pipe: File) -> u8
where
    F: FnOnce() -> R,
    R: WorkResult,
{
    let payload = {
        let redirect = match stderr.as_ref().map(StderrRedirect::new).transpose() {
            Ok(redirect) => redirect,
            Err(e) => return report(pipe, marshal::encode_fallback(&e, None)),
        };
        install_panic_hook();
        let result = panic::catch_unwind(AssertUnwindSafe(|| work().into_result()));
        drop(redirect);
        match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(marshal::encode(&e, captured(Backtrace::capture()).as_deref())),
            Err(panic) => Some(marshal::encode_panic(&*panic, PANIC_TRACE.take().as_deref())),
        }
    };
    match payload {
        Some(bytes) => report(pipe, bytes),
        None => NO_EXIT,
    }
}

fn report(mut pipe: File, payload: Vec<u8>) -> u8 {
    // If this fails the parent sees a short payload; there is nobody left to tell.
    let _ = pipe.write_all(&payload).and_then(|()| pipe.flush());
    drop(pipe);
    EXCEPTION_RAISED
}

fn install_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        PANIC_TRACE.set(Some(Backtrace::force_capture().to_string()));
        previous(info);
    }));
}

fn captured(trace: Backtrace) -> Option<String> {
    (trace.status() == BacktraceStatus::Captured).then(|| trace.to_string())
}

fn terminate(code: u8) -> ! {
    let _ = io::stdout().flush();
    posix::_exit(code)
}
