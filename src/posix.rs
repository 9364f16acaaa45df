use std::fs::File;
use std::io::{Error, Result};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::time::Duration;

use crate::outcome::RawTermination;

pub use libc::{ECHILD, ESRCH, SIGKILL};

/// Signals that indicate the process crashed rather than being stopped on purpose.
pub const FAULT_SIGNALS: [i32; 5] = [
    libc::SIGABRT,
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGILL,
    libc::SIGFPE,
];

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

/// Fork the current process, returning `Some(child_pid)` in the parent and `None` in the
/// child.
///
/// # Safety
///
/// Only the calling thread survives in the child. Code running in the child must not
/// depend on locks that other threads of the parent may have held at the time of the
/// fork.
pub unsafe fn fork() -> Result<Option<u32>> {
    let pid = check_err(unsafe { libc::fork() })?;
    Ok(if pid == 0 { None } else { Some(pid as u32) })
}

/// Terminate the process without running `atexit` handlers or destructors.
pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

pub const WNOHANG: i32 = libc::WNOHANG;

/// Wait for `pid`, returning the pid reported by the kernel together with the decoded
/// status. With `WNOHANG` the returned pid is 0 while the child is still running.
pub fn waitpid(pid: u32, flags: i32) -> Result<(u32, RawTermination)> {
    let mut status = 0 as libc::c_int;
    let pid = check_err(unsafe {
        libc::waitpid(
            pid as libc::pid_t,
            &mut status as *mut libc::c_int,
            flags as libc::c_int,
        )
    })?;
    Ok((pid as u32, decode_wait_status(status)))
}

fn decode_wait_status(status: i32) -> RawTermination {
    if libc::WIFEXITED(status) {
        RawTermination::exited(libc::WEXITSTATUS(status) as u32)
    } else if libc::WIFSIGNALED(status) {
        RawTermination::signaled(libc::WTERMSIG(status), libc::WCOREDUMP(status))
    } else {
        RawTermination::undetermined()
    }
}

pub fn kill(pid: u32, signal: i32) -> Result<()> {
    check_err(unsafe { libc::kill(pid as libc::pid_t, signal) })?;
    Ok(())
}

/// Duplicate `fd` into a new, owned descriptor.
pub fn dup(fd: RawFd) -> Result<File> {
    let new_fd = check_err(unsafe { libc::dup(fd) })?;
    Ok(unsafe { File::from_raw_fd(new_fd) })
}

pub fn dup2(oldfd: RawFd, newfd: RawFd) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

fn fcntl(fd: RawFd, cmd: i32, arg1: Option<i32>) -> Result<i32> {
    check_err(unsafe {
        match arg1 {
            Some(arg1) => libc::fcntl(fd, cmd, arg1),
            None => libc::fcntl(fd, cmd),
        }
    })
}

pub fn set_cloexec(f: &File) -> Result<()> {
    let fd = f.as_raw_fd();
    let old = fcntl(fd, libc::F_GETFD, None)?;
    fcntl(fd, libc::F_SETFD, Some(old | libc::FD_CLOEXEC))?;
    Ok(())
}

pub fn set_nonblocking(f: &File) -> Result<()> {
    let fd = f.as_raw_fd();
    let old = fcntl(fd, libc::F_GETFL, None)?;
    fcntl(fd, libc::F_SETFL, Some(old | libc::O_NONBLOCK))?;
    Ok(())
}

#[repr(C)]
pub struct PollFd(libc::pollfd);

impl PollFd {
    pub fn new(fd: RawFd, events: i16) -> PollFd {
        PollFd(libc::pollfd {
            fd,
            events,
            revents: 0,
        })
    }

    pub fn test(&self, mask: i16) -> bool {
        self.0.revents & mask != 0
    }
}

pub use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL};

/// Wait for events on `fds`, for at most `timeout` (forever if `None`).
///
/// An interrupted call (`EINTR`) is reported as zero ready descriptors.
pub fn poll(fds: &mut [PollFd], timeout: Option<Duration>) -> Result<usize> {
    let timeout = timeout
        .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
        .unwrap_or(-1);
    let fds_ptr = fds.as_mut_ptr() as *mut libc::pollfd;
    match check_err(unsafe { libc::poll(fds_ptr, fds.len() as libc::nfds_t, timeout) }) {
        Ok(cnt) => Ok(cnt as usize),
        Err(e) if e.raw_os_error() == Some(libc::EINTR) => Ok(0),
        Err(e) => Err(e),
    }
}
