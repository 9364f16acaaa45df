use std::cell::RefCell;
use std::fmt;
use std::os::unix::fs::MetadataExt;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hooks::Hooks;
use crate::{Isolate, Marshal, MarshalError, posix};

pub type Events = RefCell<Vec<String>>;

/// An error that survives the trip to the parent intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentError(pub String);

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ArgumentError {}

impl Marshal for ArgumentError {
    fn encode(&self) -> Result<Vec<u8>, MarshalError> {
        crate::to_json(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, MarshalError> {
        crate::from_json(bytes)
    }
}

/// An error that can only arrive as a fallback.
#[derive(Debug)]
pub struct Opaque(pub String);

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Marshal for Opaque {}

/// A builder whose callbacks append their names to `events`.
pub fn recording(events: &Events) -> Isolate<'_> {
    Isolate::new()
        .on_success(move || events.borrow_mut().push("success".to_owned()))
        .on_kill(move || events.borrow_mut().push("kill".to_owned()))
        .on_fault(move || events.borrow_mut().push("fault".to_owned()))
        .on_exit(move |code| events.borrow_mut().push(format!("exit {}", code)))
        .on_finish(move |success, code| {
            events
                .borrow_mut()
                .push(format!("finish {} {:?}", success, code))
        })
}

/// The same callbacks as [`recording`], for driving `Hooks::dispatch` directly.
pub fn recording_hooks(events: &Events) -> Hooks<'_> {
    Hooks {
        on_finish: Some(Box::new(move |success: bool, code: Option<u32>| {
            events
                .borrow_mut()
                .push(format!("finish {} {:?}", success, code))
        })),
        on_success: Some(Box::new(move || events.borrow_mut().push("success".to_owned()))),
        on_kill: Some(Box::new(move || events.borrow_mut().push("kill".to_owned()))),
        on_fault: Some(Box::new(move || events.borrow_mut().push("fault".to_owned()))),
        on_exit: Some(Box::new(move |code: u32| {
            events.borrow_mut().push(format!("exit {}", code))
        })),
    }
}

pub fn events(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn exit_with(code: i32) {
    std::process::exit(code)
}

pub fn kill_self() {
    posix::kill(std::process::id(), libc::SIGKILL).unwrap();
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

pub fn raise(signal: i32) {
    unsafe {
        libc::raise(signal);
    }
}

/// Die of `SIGSEGV` without a real memory fault.
///
/// The default disposition is restored first, because the runtime's stack overflow
/// handler would otherwise swallow a raised signal.
pub fn segfault() {
    unsafe {
        libc::signal(libc::SIGSEGV, libc::SIG_DFL);
    }
    raise(libc::SIGSEGV)
}

pub fn abort() {
    std::process::abort()
}

pub fn explode() {
    panic!("boom")
}

/// Device and inode of whatever fd 2 currently refers to.
pub fn stderr_identity() -> (u64, u64) {
    let meta = posix::dup(2).unwrap().metadata().unwrap();
    (meta.dev(), meta.ino())
}
