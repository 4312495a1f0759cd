//! # DFU Device Handling
//!
//! This module contains the device-side pieces of the service: functional
//! descriptor validation, the bounded slot pool, the bound device record and
//! the runtime protocol operations against it.

mod binding;
pub mod descriptor;
mod protocol;
mod slots;

pub use binding::DfuDevice;
pub use protocol::{state_name, DfuStatus};
pub use slots::{SlotPool, SlotReservation};
