//! Binding of a discovered runtime DFU interface into a device record.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::DriverConfig;
use crate::error::DfuError;
use crate::transport::ControlTransport;

use super::descriptor::FunctionalDescriptor;
use super::slots::{SlotPool, SlotReservation};

/// One bound runtime-DFU interface.
///
/// Created by [`DfuDevice::bind`] once per attached interface; dropping the
/// record (or calling [`unbind`](DfuDevice::unbind)) returns its slot to
/// the pool.
#[derive(Debug)]
pub struct DfuDevice {
    slot: SlotReservation,
    descriptor: FunctionalDescriptor,
    interface_number: u8,
    dma_capable: bool,
    transport: Arc<dyn ControlTransport>,
    config: Arc<DriverConfig>,
    io_lock: Mutex<()>,
}

impl DfuDevice {
    /// Validate the raw functional descriptor and bind the interface into a
    /// pool slot.
    ///
    /// A malformed descriptor fails before any slot is taken; a full pool
    /// fails with [`DfuError::CapacityExceeded`]. Either way the device is
    /// never exposed to the protocol operations.
    pub fn bind(
        transport: Arc<dyn ControlTransport>,
        raw_descriptor: &[u8],
        interface_number: u8,
        pool: &Arc<SlotPool>,
        config: &Arc<DriverConfig>,
    ) -> Result<Self, DfuError> {
        let descriptor = FunctionalDescriptor::parse(raw_descriptor).map_err(|err| {
            warn!(interface = interface_number, %err, "rejecting interface");
            err
        })?;
        let slot = pool.reserve().ok_or_else(|| {
            warn!(
                interface = interface_number,
                capacity = pool.capacity(),
                "maximum number of DFU devices reached"
            );
            DfuError::CapacityExceeded(pool.capacity())
        })?;
        let dma_capable = transport.dma_capable();

        debug!(
            slot = slot.index(),
            interface = interface_number,
            dma = dma_capable,
            "bound DFU interface"
        );
        Ok(Self {
            slot,
            descriptor,
            interface_number,
            dma_capable,
            transport,
            config: Arc::clone(config),
            io_lock: Mutex::new(()),
        })
    }

    pub fn slot(&self) -> usize {
        self.slot.index()
    }

    pub fn descriptor(&self) -> &FunctionalDescriptor {
        &self.descriptor
    }

    pub fn interface_number(&self) -> u8 {
        self.interface_number
    }

    /// Whether the host controller behind this device reports DMA
    /// capability.
    pub fn dma_capable(&self) -> bool {
        self.dma_capable
    }

    pub(crate) fn transport(&self) -> &dyn ControlTransport {
        self.transport.as_ref()
    }

    pub(crate) fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Scoped guard serializing protocol sequences against this device.
    ///
    /// The individual protocol operations do not take this lock themselves.
    /// A caller running a multi-step sequence that must not interleave with
    /// another one on the same device (status polling, detach handshakes)
    /// holds the guard for the whole sequence.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.io_lock.lock().unwrap()
    }

    /// Release the device and return its slot to the pool.
    ///
    /// The caller must ensure no protocol operation is still executing
    /// against this record; taking the record by value enforces that for
    /// same-thread use. Dropping the record has the same effect.
    pub fn unbind(self) {}

    /// Human-readable capability summary.
    pub fn summary(&self) -> String {
        format!(
            "Attribute: {:#04x} Timeout: {} Transfer Size: {}",
            self.descriptor.attributes(),
            self.descriptor.detach_timeout(),
            self.descriptor.transfer_size()
        )
    }
}
