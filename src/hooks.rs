use std::fmt;

use crate::outcome::Outcome;

type Callback<'a> = Box<dyn FnOnce() + 'a>;

/// Callbacks registered for an isolation call.
#[derive(Default)]
pub(crate) struct Hooks<'a> {
    pub on_finish: Option<Box<dyn FnOnce(bool, Option<u32>) + 'a>>,
    pub on_success: Option<Callback<'a>>,
    pub on_kill: Option<Callback<'a>>,
    pub on_fault: Option<Callback<'a>>,
    pub on_exit: Option<Box<dyn FnOnce(u32) + 'a>>,
}

impl Hooks<'_> {
    /// Fire the callbacks matching `outcome`.
    ///
    /// Order: `on_success`, or else `on_fault` or `on_kill`; then `on_exit` for an
    /// explicit exit; then `on_finish`. A panicking callback unwinds out of here, so the
    /// ones after it do not run.
    pub fn dispatch(self, outcome: &Outcome) {
        let Hooks {
            on_finish,
            on_success,
            on_kill,
            on_fault,
            on_exit,
        } = self;

        let success = outcome.success();
        if success {
            if let Some(f) = on_success {
                f();
            }
        } else if outcome.faulted() {
            if let Some(f) = on_fault {
                f();
            }
        } else if outcome.killed()
            && let Some(f) = on_kill
        {
            f();
        }

        if let Some(code) = outcome.exit_code()
            && let Some(f) = on_exit
        {
            f(code);
        }

        if let Some(f) = on_finish {
            f(success, outcome.code());
        }
    }
}

impl fmt::Debug for Hooks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_finish", &self.on_finish.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_kill", &self.on_kill.is_some())
            .field("on_fault", &self.on_fault.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}
