use crate::{EXCEPTION_RAISED, NO_EXIT, Outcome, RawTermination, classify};

#[test]
fn no_exit_sentinel_is_clean_completion() {
    let outcome = classify(&RawTermination::exited(NO_EXIT as u32));
    assert_eq!(outcome, Outcome::Completed);
    assert!(outcome.success());
    assert_eq!(outcome.code(), Some(0));
    assert_eq!(outcome.exit_code(), None);
}

#[test]
fn explicit_zero_exit_is_success() {
    let outcome = classify(&RawTermination::exited(0));
    assert_eq!(outcome, Outcome::Exited(0));
    assert!(outcome.success());
    assert_eq!(outcome.code(), Some(0));
    assert_eq!(outcome.exit_code(), Some(0));
}

#[test]
fn explicit_nonzero_exit() {
    let outcome = classify(&RawTermination::exited(12));
    assert_eq!(outcome, Outcome::Exited(12));
    assert!(!outcome.success());
    assert!(!outcome.killed());
    assert!(!outcome.faulted());
    assert_eq!(outcome.code(), Some(12));
}

#[test]
fn exception_sentinel_is_an_ordinary_exit_code() {
    // The monitor intercepts it before classification when a payload is present.
    let outcome = classify(&RawTermination::exited(EXCEPTION_RAISED as u32));
    assert_eq!(outcome, Outcome::Exited(123));
}

#[test]
fn sigkill_is_killed() {
    let outcome = classify(&RawTermination::signaled(libc::SIGKILL, false));
    assert_eq!(outcome, Outcome::Killed);
    assert!(outcome.killed());
    assert!(!outcome.faulted());
    assert!(!outcome.success());
    assert_eq!(outcome.code(), None);
}

#[test]
fn abort_is_fault() {
    let outcome = classify(&RawTermination::signaled(libc::SIGABRT, false));
    assert_eq!(
        outcome,
        Outcome::Faulted {
            signal: libc::SIGABRT
        }
    );
    assert!(outcome.faulted());
    assert!(!outcome.killed());
}

#[test]
fn crash_signals_are_faults() {
    for signal in [libc::SIGSEGV, libc::SIGBUS, libc::SIGILL, libc::SIGFPE] {
        let outcome = classify(&RawTermination::signaled(signal, false));
        assert_eq!(outcome, Outcome::Faulted { signal });
    }
}

#[test]
fn core_dump_is_fault_whatever_the_signal() {
    let outcome = classify(&RawTermination::signaled(libc::SIGQUIT, true));
    assert_eq!(
        outcome,
        Outcome::Faulted {
            signal: libc::SIGQUIT
        }
    );
}

#[test]
fn other_signals_are_neither_kill_nor_fault() {
    let outcome = classify(&RawTermination::signaled(libc::SIGTERM, false));
    assert_eq!(outcome, Outcome::Signaled(libc::SIGTERM));
    assert!(!outcome.success());
    assert!(!outcome.killed());
    assert!(!outcome.faulted());
    assert_eq!(outcome.code(), None);
}

#[test]
fn undetermined_status() {
    let outcome = classify(&RawTermination::undetermined());
    assert_eq!(outcome, Outcome::Undetermined);
    assert!(!outcome.success());
    assert_eq!(outcome.code(), None);
}

#[test]
fn display() {
    assert_eq!(Outcome::Completed.to_string(), "completed");
    assert_eq!(Outcome::Exited(3).to_string(), "exited with code 3");
    assert_eq!(Outcome::Killed.to_string(), "killed");
    assert_eq!(
        Outcome::Faulted { signal: 6 }.to_string(),
        "faulted with signal 6"
    );
    assert_eq!(Outcome::Signaled(15).to_string(), "terminated by signal 15");
}
