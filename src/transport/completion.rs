//! Rendezvous between the transport's completion notification and the
//! waiting caller.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use super::Completed;

/// Single-use completion signal for one submitted transfer.
///
/// [`signal`](Completion::signal) is called once per submission by the
/// transport; the first call wins and later calls are ignored. The engine
/// re-arms the signal before each submission of the same request.
///
/// The mutex/condvar pair establishes the happens-before edge between the
/// notification's writes and the caller's reads after the wait returns.
#[derive(Debug, Default)]
pub struct Completion {
    slot: Mutex<Option<Completed>>,
    fired: Condvar,
}

impl Completion {
    /// Re-arm for the next submission.
    pub(crate) fn reset(&self) {
        *self.slot.lock().unwrap() = None;
    }

    /// Completion notification entry point for transports.
    pub fn signal(&self, outcome: Completed) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            *slot = Some(outcome);
            self.fired.notify_all();
        }
    }

    /// Wait up to `timeout` for the signal. Returns false on timeout.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let slot = self.slot.lock().unwrap();
        let (slot, _) = self
            .fired
            .wait_timeout_while(slot, timeout, |outcome| outcome.is_none())
            .unwrap();
        slot.is_some()
    }

    /// Block until the signal fires.
    pub(crate) fn wait(&self) {
        let slot = self.slot.lock().unwrap();
        let _slot = self
            .fired
            .wait_while(slot, |outcome| outcome.is_none())
            .unwrap();
    }

    /// Take the recorded outcome. Returns `None` if the signal has not
    /// fired since the last reset.
    pub(crate) fn take(&self) -> Option<Completed> {
        self.slot.lock().unwrap().take()
    }
}
