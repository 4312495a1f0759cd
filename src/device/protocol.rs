//! Runtime-mode DFU protocol operations.
//!
//! Five stateless commands over the transfer engine. No DFU state machine
//! is enforced here; the peripheral polices state legality and callers
//! sequencing multiple commands hold [`DfuDevice::lock`] across the
//! sequence.

use tracing::info;

use crate::error::DfuError;
use crate::transport::{engine, Completed, ControlRequest, SetupPacket};

use super::binding::DfuDevice;

pub(crate) const DFU_DETACH: u8 = 0;
pub(crate) const DFU_GETSTATUS: u8 = 3;
pub(crate) const DFU_CLRSTATUS: u8 = 4;
pub(crate) const DFU_GETSTATE: u8 = 5;
pub(crate) const DFU_ABORT: u8 = 6;

/// bmRequestType of class requests to an interface, per direction.
const REQUEST_OUT: u8 = 0x21;
const REQUEST_IN: u8 = 0xA1;

const STATUS_LEN: u16 = 6;
const STATE_LEN: u16 = 1;

/// Decoded `DFU_GETSTATUS` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfuStatus {
    /// Device-reported status code; zero means no error.
    pub status: u8,
    /// Milliseconds the host should wait before the next status poll.
    pub poll_timeout: u32,
    /// State the device will be in once the poll timeout has elapsed.
    pub state: u8,
    /// Index of a vendor status description string, zero if none.
    pub string_index: u8,
}

impl DfuStatus {
    fn from_raw(raw: &[u8; STATUS_LEN as usize]) -> Self {
        Self {
            status: raw[0],
            poll_timeout: u32::from(raw[1]) | u32::from(raw[2]) << 8 | u32::from(raw[3]) << 16,
            state: raw[4],
            string_index: raw[5],
        }
    }

    /// Fold a non-zero device status into the error channel.
    pub fn ok(&self) -> Result<(), DfuError> {
        if self.status != 0 {
            Err(DfuError::Device(self.status))
        } else {
            Ok(())
        }
    }
}

/// Name of a DFU state byte, for diagnostics.
pub fn state_name(state: u8) -> &'static str {
    match state {
        0 => "appIDLE",
        1 => "appDETACH",
        2 => "dfuIDLE",
        3 => "dfuDNLOAD-SYNC",
        4 => "dfuDNBUSY",
        5 => "dfuDNLOAD-IDLE",
        6 => "dfuMANIFEST-SYNC",
        7 => "dfuMANIFEST",
        8 => "dfuMANIFEST-WAIT-RESET",
        9 => "dfuUPLOAD-IDLE",
        10 => "dfuERROR",
        _ => "unknown",
    }
}

impl DfuDevice {
    fn request_setup(&self, request_type: u8, request: u8, value: u16, length: u16) -> SetupPacket {
        SetupPacket {
            request_type,
            request,
            value,
            index: u16::from(self.interface_number()),
            length,
        }
    }

    fn execute(&self, request: &mut ControlRequest) -> Result<Completed, DfuError> {
        Ok(engine::execute(
            self.transport(),
            request,
            self.config().request_timeout(),
        )?)
    }

    /// Command the device to leave runtime mode and await DFU mode.
    ///
    /// The wire timeout is the device-declared detach timeout clamped to
    /// the configured ceiling. A device without the will-detach capability
    /// additionally needs a bus reset, which is the caller's business.
    pub fn detach(&self) -> Result<(), DfuError> {
        let wire_timeout = self
            .descriptor()
            .detach_timeout()
            .min(self.config().detach_ceiling_ms());
        let mut request =
            ControlRequest::new(self.request_setup(REQUEST_OUT, DFU_DETACH, wire_timeout, 0));
        self.execute(&mut request)?;
        if !self.descriptor().will_detach() {
            info!(
                interface = self.interface_number(),
                "device does not self-detach, a bus reset is needed to enter DFU mode"
            );
        }
        Ok(())
    }

    /// Opportunistic abort of whatever the device is doing. Failures are
    /// expected (the device may have nothing to abort) and are not logged.
    pub fn abort(&self) -> Result<(), DfuError> {
        let mut request = ControlRequest::new(self.request_setup(REQUEST_OUT, DFU_ABORT, 0, 0))
            .expect_failure();
        self.execute(&mut request)?;
        Ok(())
    }

    /// Query the device's status record.
    pub fn get_status(&self) -> Result<DfuStatus, DfuError> {
        let mut request =
            ControlRequest::new(self.request_setup(REQUEST_IN, DFU_GETSTATUS, 0, STATUS_LEN));
        let completed = self.execute(&mut request)?;
        let data = completed.data.unwrap_or_default();
        let raw: &[u8; STATUS_LEN as usize] =
            data.as_slice()
                .try_into()
                .map_err(|_| DfuError::ShortResponse {
                    expected: STATUS_LEN as usize,
                    actual: data.len(),
                })?;
        Ok(DfuStatus::from_raw(raw))
    }

    /// Query the device's current DFU state byte.
    pub fn get_state(&self) -> Result<u8, DfuError> {
        let mut request =
            ControlRequest::new(self.request_setup(REQUEST_IN, DFU_GETSTATE, 0, STATE_LEN));
        let completed = self.execute(&mut request)?;
        completed
            .data
            .as_deref()
            .and_then(|data| data.first().copied())
            .ok_or(DfuError::ShortResponse {
                expected: STATE_LEN as usize,
                actual: completed.actual_len,
            })
    }

    /// Acknowledge an error state on the device, returning it to `dfuIDLE`.
    pub fn clear_status(&self) -> Result<(), DfuError> {
        let mut request =
            ControlRequest::new(self.request_setup(REQUEST_OUT, DFU_CLRSTATUS, 0, 0));
        self.execute(&mut request)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::descriptor::raw_descriptor;
    use super::super::slots::SlotPool;
    use super::*;
    use crate::config::{DriverConfig, Timeouts};
    use crate::transport::mock::{MockTransport, Script};
    use crate::transport::{TransferError, TransferStatus};

    const INTERFACE: u8 = 2;

    fn device_with(
        transport: &Arc<MockTransport>,
        detach_timeout: u16,
        ceiling_ms: u64,
    ) -> DfuDevice {
        let config = DriverConfig::new(
            8,
            Timeouts {
                request: std::time::Duration::from_secs(5),
                detach_ceiling: std::time::Duration::from_millis(ceiling_ms),
            },
        );
        let pool = SlotPool::new(8);
        DfuDevice::bind(
            Arc::clone(transport) as Arc<dyn crate::transport::ControlTransport>,
            &raw_descriptor(0x0B, detach_timeout, 2048),
            INTERFACE,
            &pool,
            &config,
        )
        .unwrap()
    }

    fn device(transport: &Arc<MockTransport>) -> DfuDevice {
        device_with(transport, 1000, 2000)
    }

    #[test]
    fn detach_clamps_the_wire_timeout_to_the_ceiling() {
        let transport = Arc::new(MockTransport::new());
        device_with(&transport, 5000, 2000).detach().unwrap();
        device_with(&transport, 500, 2000).detach().unwrap();

        let submissions = transport.submissions();
        assert_eq!(submissions[0].value, 2000);
        assert_eq!(submissions[1].value, 500);
    }

    #[test]
    fn detach_sends_the_detach_request_to_the_interface() {
        let transport = Arc::new(MockTransport::new());
        device(&transport).detach().unwrap();

        let setup = transport.submissions()[0];
        assert_eq!(setup.request_type, 0x21);
        assert_eq!(setup.request, DFU_DETACH);
        assert_eq!(setup.index, u16::from(INTERFACE));
        assert_eq!(setup.length, 0);
    }

    #[test]
    fn get_status_decodes_the_six_byte_payload() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Script::Complete {
            status: TransferStatus::Completed,
            data: Some(vec![0x00, 0x0A, 0x00, 0x00, 0x02, 0x00]),
        });

        let status = device(&transport).get_status().unwrap();
        assert_eq!(
            status,
            DfuStatus {
                status: 0,
                poll_timeout: 10,
                state: 2,
                string_index: 0,
            }
        );
        assert!(status.ok().is_ok());

        let setup = transport.submissions()[0];
        assert_eq!(setup.request_type, 0xA1);
        assert_eq!(setup.request, DFU_GETSTATUS);
        assert_eq!(setup.value, 0);
        assert_eq!(setup.length, 6);
    }

    #[test]
    fn get_status_decodes_the_multibyte_poll_timeout() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Script::Complete {
            status: TransferStatus::Completed,
            data: Some(vec![0x0A, 0x10, 0x27, 0x00, 0x0A, 0x01]),
        });

        let status = device(&transport).get_status().unwrap();
        assert_eq!(status.poll_timeout, 10000);
        assert_eq!(status.state, 10);
        assert_eq!(status.string_index, 1);
        assert_eq!(status.ok().unwrap_err(), DfuError::Device(0x0A));
    }

    #[test]
    fn get_status_rejects_short_responses() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Script::Complete {
            status: TransferStatus::Completed,
            data: Some(vec![0x00, 0x0A]),
        });

        assert_eq!(
            device(&transport).get_status().unwrap_err(),
            DfuError::ShortResponse {
                expected: 6,
                actual: 2
            }
        );
    }

    #[test]
    fn get_state_returns_the_decoded_state_byte() {
        for state in [0u8, 2, 10, 255] {
            let transport = Arc::new(MockTransport::new());
            transport.push(Script::Complete {
                status: TransferStatus::Completed,
                data: Some(vec![state]),
            });

            assert_eq!(device(&transport).get_state().unwrap(), state);

            let setup = transport.submissions()[0];
            assert_eq!(setup.request_type, 0xA1);
            assert_eq!(setup.request, DFU_GETSTATE);
            assert_eq!(setup.length, 1);
        }
    }

    #[test]
    fn get_state_rejects_an_empty_response() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Script::Complete {
            status: TransferStatus::Completed,
            data: Some(vec![]),
        });

        assert_eq!(
            device(&transport).get_state().unwrap_err(),
            DfuError::ShortResponse {
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn clear_status_and_abort_are_zero_length_out_requests() {
        let transport = Arc::new(MockTransport::new());
        let device = device(&transport);
        device.clear_status().unwrap();
        device.abort().unwrap();

        let submissions = transport.submissions();
        for setup in &submissions {
            assert_eq!(setup.request_type, 0x21);
            assert_eq!(setup.value, 0);
            assert_eq!(setup.length, 0);
            assert_eq!(setup.index, u16::from(INTERFACE));
        }
        assert_eq!(submissions[0].request, DFU_CLRSTATUS);
        assert_eq!(submissions[1].request, DFU_ABORT);
    }

    #[test]
    fn transport_failures_surface_as_transfer_errors() {
        let transport = Arc::new(MockTransport::new());
        transport.push(Script::Complete {
            status: TransferStatus::Stall,
            data: None,
        });

        assert_eq!(
            device(&transport).clear_status().unwrap_err(),
            DfuError::Transfer(TransferError::Stall)
        );
    }

    #[test]
    fn state_names_cover_the_dfu_state_space() {
        assert_eq!(state_name(0), "appIDLE");
        assert_eq!(state_name(2), "dfuIDLE");
        assert_eq!(state_name(10), "dfuERROR");
        assert_eq!(state_name(42), "unknown");
    }
}
