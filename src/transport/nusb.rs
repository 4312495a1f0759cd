//! `nusb`-backed transport.
//!
//! `nusb`'s control-transfer calls are blocking with their own deadline, so
//! a submission runs on a helper thread and reports back through the
//! completion. Cancellation is cooperative: `cancel` flags the transfer,
//! and the backend deadline bounds how long the completion can take to
//! arrive afterwards.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError as NusbError};
use nusb::MaybeFuture;
use tracing::debug;

use super::{
    Completed, Completion, ControlTransport, SetupPacket, TransferError, TransferHandle,
    TransferStatus,
};

pub struct NusbTransport {
    interface: nusb::Interface,
    /// Hard deadline handed to `nusb`; every submitted transfer completes
    /// within this bound even if cancellation is requested.
    deadline: Duration,
    next_token: AtomicU64,
    cancelled: Arc<Mutex<HashSet<u64>>>,
}

impl fmt::Debug for NusbTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NusbTransport")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl NusbTransport {
    /// Wrap a claimed interface. `deadline` must exceed the engine's
    /// per-request timeout, or transfers get cut short by the backend.
    pub fn new(interface: nusb::Interface, deadline: Duration) -> Self {
        Self {
            interface,
            deadline,
            next_token: AtomicU64::new(0),
            cancelled: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl ControlTransport for NusbTransport {
    fn allocate(&self) -> Result<TransferHandle, TransferError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        Ok(TransferHandle::new(token))
    }

    fn submit(
        &self,
        handle: &TransferHandle,
        setup: SetupPacket,
        data: Option<Vec<u8>>,
        completion: Arc<Completion>,
    ) -> Result<(), TransferError> {
        let interface = self.interface.clone();
        let deadline = self.deadline;
        let cancelled = Arc::clone(&self.cancelled);
        let token = handle.token();
        thread::Builder::new()
            .name("usbdfud-xfer".into())
            .spawn(move || run_transfer(interface, deadline, setup, data, completion, cancelled, token))
            .map_err(|_| TransferError::Rejected)?;
        Ok(())
    }

    fn cancel(&self, handle: &TransferHandle) {
        debug!(token = handle.token(), "cancellation requested");
        self.cancelled.lock().unwrap().insert(handle.token());
    }

    fn free(&self, handle: TransferHandle) {
        self.cancelled.lock().unwrap().remove(&handle.token());
    }

    fn dma_capable(&self) -> bool {
        // Host controllers reachable through the host USB stack do their own
        // buffer management; treat them as DMA capable.
        true
    }
}

#[allow(clippy::too_many_arguments)]
fn run_transfer(
    interface: nusb::Interface,
    deadline: Duration,
    setup: SetupPacket,
    data: Option<Vec<u8>>,
    completion: Arc<Completion>,
    cancelled: Arc<Mutex<HashSet<u64>>>,
    token: u64,
) {
    let outcome = if setup.is_in() {
        let control = ControlIn {
            control_type: control_type(setup.request_type),
            recipient: recipient(setup.request_type),
            request: setup.request,
            value: setup.value,
            index: setup.index,
            length: setup.length,
        };
        match interface.control_in(control, deadline).wait() {
            Ok(response) => Completed {
                status: TransferStatus::Completed,
                actual_len: response.len(),
                data: Some(response),
            },
            Err(err) => Completed {
                status: status_of(&err),
                actual_len: 0,
                data: None,
            },
        }
    } else {
        let payload = data.unwrap_or_default();
        let control = ControlOut {
            control_type: control_type(setup.request_type),
            recipient: recipient(setup.request_type),
            request: setup.request,
            value: setup.value,
            index: setup.index,
            data: &payload,
        };
        let result = interface.control_out(control, deadline).wait();
        match result {
            Ok(()) => Completed {
                status: TransferStatus::Completed,
                actual_len: payload.len(),
                data: Some(payload),
            },
            Err(err) => Completed {
                status: status_of(&err),
                actual_len: 0,
                data: Some(payload),
            },
        }
    };

    // A transfer that failed after a cancellation request reports the
    // cancellation, whatever the backend said.
    let was_cancelled = cancelled.lock().unwrap().remove(&token);
    let outcome = if was_cancelled && outcome.status != TransferStatus::Completed {
        Completed {
            status: TransferStatus::Cancelled,
            ..outcome
        }
    } else {
        outcome
    };
    completion.signal(outcome);
}

const fn control_type(request_type: u8) -> ControlType {
    match (request_type >> 5) & 0x3 {
        0 => ControlType::Standard,
        1 => ControlType::Class,
        _ => ControlType::Vendor,
    }
}

const fn recipient(request_type: u8) -> Recipient {
    match request_type & 0x1F {
        0 => Recipient::Device,
        1 => Recipient::Interface,
        2 => Recipient::Endpoint,
        _ => Recipient::Other,
    }
}

fn status_of(err: &NusbError) -> TransferStatus {
    match err {
        NusbError::Cancelled => TransferStatus::Cancelled,
        NusbError::Stall => TransferStatus::Stall,
        NusbError::Disconnected => TransferStatus::Disconnected,
        _ => TransferStatus::Error,
    }
}
