//! This module implements the CLI interface.
//!
//! The options mirror the service's process-wide configuration: device
//! capacity and the two timeouts, plus an optional VID:PID filter and the
//! command to run against each matched runtime DFU interface.
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::config::{Timeouts, DEFAULT_MAX_DEVICES};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
pub struct Cli {
    /// Enable verbose logging. Can be specified multiple times to
    /// increase verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Maximum number of DFU interfaces served concurrently.
    #[arg(long, default_value_t = DEFAULT_MAX_DEVICES)]
    pub max_devices: usize,

    /// Deadline for one control request, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 200)]
    pub request_timeout_ms: u64,

    /// Upper bound for the detach timeout sent to the device, in
    /// milliseconds.
    #[arg(long, value_name = "MS", default_value_t = 2000)]
    pub detach_timeout_ms: u64,

    /// Only talk to devices with this vendor/product ID (hexadecimal).
    #[arg(long, value_name = "VID:PID", value_parser = parse_device_id)]
    pub device: Option<DeviceId>,

    /// What to do with each matched runtime DFU interface.
    #[arg(value_enum, default_value = "status")]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the DFU capability record and the device's status.
    Status,
    /// Query and print the current DFU state.
    State,
    /// Command the device to switch into DFU mode.
    Detach,
    /// Acknowledge an error state on the device.
    Clear,
    /// Opportunistically abort whatever the device is doing.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor: u16,
    pub product: u16,
}

fn parse_device_id(value: &str) -> Result<DeviceId, String> {
    let (vendor, product) = value
        .split_once(':')
        .ok_or_else(|| "expected VID:PID".to_string())?;
    Ok(DeviceId {
        vendor: u16::from_str_radix(vendor, 16).map_err(|err| err.to_string())?,
        product: u16::from_str_radix(product, 16).map_err(|err| err.to_string())?,
    })
}

impl Cli {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request: Duration::from_millis(self.request_timeout_ms),
            detach_ceiling: Duration::from_millis(self.detach_timeout_ms),
        }
    }
}
