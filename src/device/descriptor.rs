//! DFU functional descriptor validation and decoding.
//!
//! The functional descriptor (DFU 1.1, section 4.1.3) is the capability
//! record a DFU-capable interface carries: attribute bits plus the
//! little-endian detach timeout and transfer size fields.

use thiserror::Error;

pub(crate) const DFU_FUNC_DESC_LEN: usize = 9;
pub(crate) const DFU_FUNC_DESC_TYPE: u8 = 0x21;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("functional descriptor has length {0}, expected {DFU_FUNC_DESC_LEN}")]
    Length(usize),
    #[error("descriptor type {0:#04x} is not a DFU functional descriptor")]
    Type(u8),
}

/// Decoded DFU functional descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionalDescriptor {
    attributes: u8,
    detach_timeout: u16,
    transfer_size: u16,
    dfu_version: u16,
}

impl FunctionalDescriptor {
    const BIT_CAN_DNLOAD: u8 = 1 << 0;
    const BIT_CAN_UPLOAD: u8 = 1 << 1;
    const BIT_MANIFESTATION_TOLERANT: u8 = 1 << 2;
    const BIT_WILL_DETACH: u8 = 1 << 3;

    /// Decode a raw functional descriptor, rejecting anything that is not
    /// exactly one descriptor of the expected length and type tag.
    pub fn parse(raw: &[u8]) -> Result<Self, DescriptorError> {
        if raw.len() != DFU_FUNC_DESC_LEN {
            return Err(DescriptorError::Length(raw.len()));
        }
        if raw[1] != DFU_FUNC_DESC_TYPE {
            return Err(DescriptorError::Type(raw[1]));
        }
        Ok(Self {
            attributes: raw[2],
            detach_timeout: u16::from_le_bytes([raw[3], raw[4]]),
            transfer_size: u16::from_le_bytes([raw[5], raw[6]]),
            dfu_version: u16::from_le_bytes([raw[7], raw[8]]),
        })
    }

    /// Raw attribute bitmask (`bmAttributes`).
    pub fn attributes(&self) -> u8 {
        self.attributes
    }

    /// Download capable (`bitCanDnload`).
    pub fn can_download(&self) -> bool {
        self.attributes & Self::BIT_CAN_DNLOAD != 0
    }

    /// Upload capable (`bitCanUpload`).
    pub fn can_upload(&self) -> bool {
        self.attributes & Self::BIT_CAN_UPLOAD != 0
    }

    /// Device stays on the bus after the manifestation phase
    /// (`bitManifestationTolerant`).
    pub fn manifestation_tolerant(&self) -> bool {
        self.attributes & Self::BIT_MANIFESTATION_TOLERANT != 0
    }

    /// Device performs its own detach-attach sequence on `DFU_DETACH`
    /// (`bitWillDetach`); otherwise the host must issue a bus reset.
    pub fn will_detach(&self) -> bool {
        self.attributes & Self::BIT_WILL_DETACH != 0
    }

    /// Milliseconds the device waits for a reset after `DFU_DETACH`
    /// (`wDetachTimeOut`).
    pub fn detach_timeout(&self) -> u16 {
        self.detach_timeout
    }

    /// Maximum bytes per control-write transaction (`wTransferSize`).
    pub fn transfer_size(&self) -> u16 {
        self.transfer_size
    }

    /// DFU specification release (`bcdDFUVersion`).
    pub fn dfu_version(&self) -> u16 {
        self.dfu_version
    }
}

#[cfg(test)]
pub(crate) fn raw_descriptor(attributes: u8, detach_timeout: u16, transfer_size: u16) -> [u8; 9] {
    let timeout = detach_timeout.to_le_bytes();
    let size = transfer_size.to_le_bytes();
    [
        DFU_FUNC_DESC_LEN as u8,
        DFU_FUNC_DESC_TYPE,
        attributes,
        timeout[0],
        timeout[1],
        size[0],
        size[1],
        0x10,
        0x01,
    ]
}
