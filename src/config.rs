//! Process-wide configuration.
//!
//! The device capacity is fixed at startup. The timeouts can be adjusted at
//! runtime and take effect on the next submission, so they sit behind an
//! [`ArcSwap`]; in-flight transfers keep the deadline they started with.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

pub const DEFAULT_MAX_DEVICES: usize = 8;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(200);
pub const DEFAULT_DETACH_CEILING: Duration = Duration::from_millis(2000);

/// Adjustable per-request deadlines.
#[derive(Debug, Clone)]
pub struct Timeouts {
    /// Bound on one control-transfer round trip.
    pub request: Duration,
    /// Ceiling clamped onto the device-declared detach timeout.
    pub detach_ceiling: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: DEFAULT_REQUEST_TIMEOUT,
            detach_ceiling: DEFAULT_DETACH_CEILING,
        }
    }
}

#[derive(Debug)]
pub struct DriverConfig {
    max_devices: usize,
    timeouts: ArcSwap<Timeouts>,
}

impl DriverConfig {
    pub fn new(max_devices: usize, timeouts: Timeouts) -> Arc<Self> {
        Arc::new(Self {
            max_devices,
            timeouts: ArcSwap::from_pointee(timeouts),
        })
    }

    pub fn max_devices(&self) -> usize {
        self.max_devices
    }

    pub fn request_timeout(&self) -> Duration {
        self.timeouts.load().request
    }

    pub fn detach_ceiling(&self) -> Duration {
        self.timeouts.load().detach_ceiling
    }

    /// Detach ceiling in milliseconds as it goes on the wire.
    pub fn detach_ceiling_ms(&self) -> u16 {
        self.detach_ceiling()
            .as_millis()
            .min(u128::from(u16::MAX)) as u16
    }

    /// Replace the timeouts; applies from the next submission on.
    pub fn set_timeouts(&self, timeouts: Timeouts) {
        self.timeouts.store(Arc::new(timeouts));
    }
}
