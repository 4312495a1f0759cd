//! Error taxonomy of the DFU runtime protocol layer.

use thiserror::Error;

use crate::device::descriptor::DescriptorError;
use crate::transport::TransferError;

/// Failures surfaced by binding and the protocol operations.
///
/// Local transport failures and device-reported DFU status codes travel on
/// separate variants instead of sharing one integer range. Nothing here is
/// fatal to the process; every failure is scoped to one operation or one
/// device.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DfuError {
    /// Local failure: allocation, submission or timeout-triggered
    /// cancellation.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Non-zero status reported by the peripheral itself, to be interpreted
    /// against the DFU state machine.
    #[error("device reported DFU status {0:#04x}")]
    Device(u8),

    /// The interface does not carry a valid DFU functional descriptor.
    #[error("unsupported device: {0}")]
    UnsupportedDevice(#[from] DescriptorError),

    /// All device slots are taken.
    #[error("maximum number of DFU devices reached ({0})")]
    CapacityExceeded(usize),

    /// The device answered with fewer bytes than the response needs.
    #[error("short response from device ({actual} of {expected} bytes)")]
    ShortResponse { expected: usize, actual: usize },
}
