//! # Control-Transfer Transport Layer
//!
//! This module contains the seam between the protocol code and the host USB
//! stack ([`ControlTransport`]), the per-transfer request context
//! ([`ControlRequest`]) and the execution engine ([`engine`]).
//!
//! Submission is asynchronous: the transport delivers a completion
//! notification through a [`Completion`] rendezvous when a transfer
//! finishes, fails or is cancelled. The engine never considers a transfer
//! finished before that notification has fired, which is what keeps the
//! request context and its buffer safe to reuse or drop afterwards.

mod completion;
pub mod engine;
#[cfg(test)]
pub(crate) mod mock;
mod nusb;

pub use completion::Completion;
pub use self::nusb::NusbTransport;

use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

/// The setup header of a USB control transfer, in host byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    /// Direction bit of `bmRequestType`: true for device-to-host.
    pub const fn is_in(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}

/// Final status of a submitted control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The device answered the request.
    Completed,
    /// The transfer ended because cancellation was requested.
    Cancelled,
    /// The device stalled the control endpoint.
    Stall,
    /// The device left the bus.
    Disconnected,
    /// Any other transport-level failure.
    Error,
}

/// Outcome recorded by the transport's completion notification.
#[derive(Debug)]
pub struct Completed {
    pub status: TransferStatus,
    /// Bytes actually moved in the data phase.
    pub actual_len: usize,
    /// Buffer handed over at submission, returned once the transport is done
    /// with it. Carries the device's response for IN transfers.
    pub data: Option<Vec<u8>>,
}

/// Opaque reference to a transport-level request object.
#[derive(Debug, PartialEq, Eq)]
pub struct TransferHandle(u64);

impl TransferHandle {
    pub(crate) const fn new(token: u64) -> Self {
        Self(token)
    }

    pub(crate) const fn token(&self) -> u64 {
        self.0
    }
}

/// Local transfer failures, as opposed to errors the peripheral reports
/// through the DFU status machinery.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("cannot allocate a transfer")]
    NoTransfer,
    #[error("transfer rejected on submission")]
    Rejected,
    #[error("transfer cancelled")]
    Cancelled,
    #[error("control endpoint stalled")]
    Stall,
    #[error("device disconnected")]
    Disconnected,
    #[error("transfer failed")]
    Failed,
}

/// The host USB stack as seen by the transfer engine.
///
/// `submit` must arrange for `completion` to be signalled exactly once, on
/// whatever context the transport uses for notifications. `cancel` only
/// *requests* cancellation; the definitive end of a transfer is always the
/// completion signal, even for cancelled transfers.
pub trait ControlTransport: Debug + Send + Sync {
    /// Allocate a transport request object.
    fn allocate(&self) -> Result<TransferHandle, TransferError>;

    /// Submit a control transfer.
    ///
    /// Ownership of `data` moves to the transport until it is handed back
    /// through the completion. An `Err` means nothing was submitted and no
    /// completion will fire.
    fn submit(
        &self,
        handle: &TransferHandle,
        setup: SetupPacket,
        data: Option<Vec<u8>>,
        completion: Arc<Completion>,
    ) -> Result<(), TransferError>;

    /// Request cancellation of an in-flight transfer.
    fn cancel(&self, handle: &TransferHandle);

    /// Release a request object obtained from [`allocate`](Self::allocate).
    ///
    /// Only legal once no completion notification can still reference the
    /// handle.
    fn free(&self, handle: TransferHandle);

    /// Whether the host controller behind this transport reports DMA
    /// capability.
    fn dma_capable(&self) -> bool;
}

/// One control transfer: setup header, optional OUT payload and the
/// rendezvous the transport completes into.
///
/// A request is submitted at most once at a time; the setup fields and the
/// payload must not change while a submission is outstanding. The engine
/// allocates and frees a transport handle per call unless the caller
/// supplied one via [`with_handle`](ControlRequest::with_handle).
#[derive(Debug)]
pub struct ControlRequest {
    setup: SetupPacket,
    data: Option<Vec<u8>>,
    handle: Option<TransferHandle>,
    completion: Arc<Completion>,
    quiet: bool,
}

impl ControlRequest {
    pub fn new(setup: SetupPacket) -> Self {
        Self {
            setup,
            data: None,
            handle: None,
            completion: Arc::new(Completion::default()),
            quiet: false,
        }
    }

    /// Request with an OUT data phase.
    pub fn with_data(setup: SetupPacket, data: Vec<u8>) -> Self {
        Self {
            data: Some(data),
            ..Self::new(setup)
        }
    }

    /// Attach a caller-owned transport handle, reused across retries. The
    /// engine will not free it.
    pub fn with_handle(mut self, handle: TransferHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Mark failures of this request as expected; the engine will not log
    /// them.
    pub fn expect_failure(mut self) -> Self {
        self.quiet = true;
        self
    }

    pub fn setup(&self) -> SetupPacket {
        self.setup
    }

    /// Reclaim a handle previously attached with
    /// [`with_handle`](ControlRequest::with_handle).
    pub fn take_handle(&mut self) -> Option<TransferHandle> {
        self.handle.take()
    }
}
