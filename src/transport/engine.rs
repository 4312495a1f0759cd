//! # Control-Transfer Execution Engine
//!
//! Submits a [`ControlRequest`] through a [`ControlTransport`], waits for
//! the completion with a bounded timeout and cancels the transfer if the
//! device does not respond in time.
//!
//! Cancellation is cooperative. After asking the transport to cancel, the
//! engine still blocks until the completion notification fires: the
//! notification may already be in flight, and the request context and any
//! allocated transport handle must stay live until the transport has
//! unambiguously let go of them. Only then is the handle released.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Completed, ControlRequest, ControlTransport, TransferError, TransferStatus};

/// Execute `request` on `transport`, waiting at most `timeout` for the
/// device to respond.
///
/// On success the returned [`Completed`] carries the actual transferred
/// length and, for IN transfers, the response data. Allocation and
/// submission failures, transport-level errors and timeout-triggered
/// cancellation all surface as [`TransferError`]; a timed-out transfer
/// reports [`TransferError::Cancelled`] once the transport has acknowledged
/// the cancellation.
pub fn execute(
    transport: &dyn ControlTransport,
    request: &mut ControlRequest,
    timeout: Duration,
) -> Result<Completed, TransferError> {
    let allocated = if request.handle.is_none() {
        request.handle = Some(transport.allocate()?);
        true
    } else {
        false
    };

    let result = submit_and_wait(transport, request, timeout);

    if allocated {
        // submit_and_wait never returns while a completion notification for
        // this handle can still arrive, so releasing it here is safe.
        if let Some(handle) = request.handle.take() {
            transport.free(handle);
        }
    }

    if let Err(err) = &result {
        if !request.quiet {
            warn!(
                request_type = format_args!("{:#04x}", request.setup.request_type),
                request = format_args!("{:#04x}", request.setup.request),
                %err,
                "control transfer failed"
            );
        }
    }
    result
}

fn submit_and_wait(
    transport: &dyn ControlTransport,
    request: &mut ControlRequest,
    timeout: Duration,
) -> Result<Completed, TransferError> {
    let Some(handle) = request.handle.as_ref() else {
        return Err(TransferError::NoTransfer);
    };

    request.completion.reset();
    let data = request.data.take();
    transport.submit(handle, request.setup, data, Arc::clone(&request.completion))?;

    if !request.completion.wait_timeout(timeout) {
        debug!(
            request = format_args!("{:#04x}", request.setup.request),
            timeout_ms = timeout.as_millis() as u64,
            "control transfer timed out, cancelling"
        );
        transport.cancel(handle);
        // The transfer stays live until the transport acknowledges the
        // cancellation through the completion notification.
        request.completion.wait();
    }

    let Some(outcome) = request.completion.take() else {
        // Unreachable once the waits above returned, but a missing outcome
        // must not be mistaken for success.
        return Err(TransferError::Failed);
    };
    match outcome.status {
        TransferStatus::Completed => Ok(outcome),
        TransferStatus::Cancelled => Err(TransferError::Cancelled),
        TransferStatus::Stall => Err(TransferError::Stall),
        TransferStatus::Disconnected => Err(TransferError::Disconnected),
        TransferStatus::Error => Err(TransferError::Failed),
    }
}
