//! Scripted transport for exercising the engine and the protocol
//! operations without hardware.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{
    Completed, Completion, ControlTransport, SetupPacket, TransferError, TransferHandle,
    TransferStatus,
};

/// What the scripted transport does with the next submitted transfer.
#[derive(Debug)]
pub enum Script {
    /// Signal the completion immediately.
    Complete {
        status: TransferStatus,
        /// IN response data; `None` echoes the submitted OUT payload.
        data: Option<Vec<u8>>,
    },
    /// Signal the completion from another thread after `delay`.
    CompleteAfter {
        delay: Duration,
        status: TransferStatus,
        data: Option<Vec<u8>>,
    },
    /// Never complete on its own. The transfer only finishes, with
    /// `Cancelled`, once `cancel` is called, and even then only after
    /// `cancel_latency` has passed.
    HangUntilCancel { cancel_latency: Duration },
    /// Refuse the submission outright.
    Reject,
}

#[derive(Debug, Default)]
struct State {
    scripts: VecDeque<Script>,
    submissions: Vec<SetupPacket>,
    pending: Option<PendingCancel>,
    next_token: u64,
    live_handles: usize,
    cancels: usize,
    fail_allocation: bool,
    dma: bool,
}

#[derive(Debug)]
struct PendingCancel {
    completion: Arc<Completion>,
    latency: Duration,
    data: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                dma: true,
                ..State::default()
            }),
        }
    }

    pub fn push(&self, script: Script) {
        self.state.lock().unwrap().scripts.push_back(script);
    }

    pub fn fail_allocation(&self) {
        self.state.lock().unwrap().fail_allocation = true;
    }

    pub fn set_dma(&self, dma: bool) {
        self.state.lock().unwrap().dma = dma;
    }

    /// Setup packets seen so far, in submission order.
    pub fn submissions(&self) -> Vec<SetupPacket> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn cancel_count(&self) -> usize {
        self.state.lock().unwrap().cancels
    }

    /// Handles allocated but not yet freed.
    pub fn live_handles(&self) -> usize {
        self.state.lock().unwrap().live_handles
    }
}

fn outcome(status: TransferStatus, scripted: Option<Vec<u8>>, submitted: Option<Vec<u8>>) -> Completed {
    let data = scripted.or(submitted);
    Completed {
        actual_len: data.as_ref().map_or(0, Vec::len),
        status,
        data,
    }
}

impl ControlTransport for MockTransport {
    fn allocate(&self) -> Result<TransferHandle, TransferError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_allocation {
            return Err(TransferError::NoTransfer);
        }
        state.next_token += 1;
        state.live_handles += 1;
        Ok(TransferHandle::new(state.next_token))
    }

    fn submit(
        &self,
        _handle: &TransferHandle,
        setup: SetupPacket,
        data: Option<Vec<u8>>,
        completion: Arc<Completion>,
    ) -> Result<(), TransferError> {
        let script = {
            let mut state = self.state.lock().unwrap();
            state.submissions.push(setup);
            state.scripts.pop_front()
        };
        match script {
            // An unscripted submission completes successfully.
            None => completion.signal(outcome(TransferStatus::Completed, None, data)),
            Some(Script::Complete { status, data: scripted }) => {
                completion.signal(outcome(status, scripted, data));
            }
            Some(Script::CompleteAfter {
                delay,
                status,
                data: scripted,
            }) => {
                thread::spawn(move || {
                    thread::sleep(delay);
                    completion.signal(outcome(status, scripted, data));
                });
            }
            Some(Script::HangUntilCancel { cancel_latency }) => {
                self.state.lock().unwrap().pending = Some(PendingCancel {
                    completion,
                    latency: cancel_latency,
                    data,
                });
            }
            Some(Script::Reject) => return Err(TransferError::Rejected),
        }
        Ok(())
    }

    fn cancel(&self, _handle: &TransferHandle) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            state.cancels += 1;
            state.pending.take()
        };
        if let Some(PendingCancel {
            completion,
            latency,
            data,
        }) = pending
        {
            thread::spawn(move || {
                thread::sleep(latency);
                completion.signal(outcome(TransferStatus::Cancelled, None, data));
            });
        }
    }

    fn free(&self, _handle: TransferHandle) {
        let mut state = self.state.lock().unwrap();
        state.live_handles = state.live_handles.saturating_sub(1);
    }

    fn dma_capable(&self) -> bool {
        self.state.lock().unwrap().dma
    }
}
