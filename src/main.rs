mod cli;
mod config;
mod device;
mod error;
mod transport;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use nusb::MaybeFuture;

use cli::{Cli, Command};
use config::DriverConfig;
use device::descriptor::DFU_FUNC_DESC_TYPE;
use device::{state_name, DfuDevice, SlotPool};
use transport::NusbTransport;

const DFU_CLASS: u8 = 0xFE;
const DFU_SUBCLASS: u8 = 0x01;
const DFU_PROTOCOL_RUNTIME: u8 = 0x01;

fn main() -> Result<()> {
    let args = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(match args.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    let config = DriverConfig::new(args.max_devices, args.timeouts());
    let pool = SlotPool::new(config.max_devices());

    let mut matched = 0;
    for info in nusb::list_devices()
        .wait()
        .context("Cannot enumerate USB devices")?
    {
        if let Some(id) = args.device {
            if info.vendor_id() != id.vendor || info.product_id() != id.product {
                continue;
            }
        }
        if !info.interfaces().any(|intf| {
            intf.class() == DFU_CLASS
                && intf.subclass() == DFU_SUBCLASS
                && intf.protocol() == DFU_PROTOCOL_RUNTIME
        }) {
            continue;
        }
        matched += 1;
        if let Err(err) = serve_device(&info, args.command, &pool, &config) {
            warn!(
                bus = info.bus_id(),
                address = info.device_address(),
                %err,
                "skipping device"
            );
        }
    }
    if matched == 0 {
        bail!("no runtime DFU device found");
    }
    Ok(())
}

fn serve_device(
    info: &nusb::DeviceInfo,
    command: Command,
    pool: &Arc<SlotPool>,
    config: &Arc<DriverConfig>,
) -> Result<()> {
    let device = info.open().wait().context("Cannot open device")?;
    let Some((interface_number, raw_descriptor)) = find_runtime_interface(&device) else {
        bail!("device carries no DFU functional descriptor");
    };
    let interface = device
        .claim_interface(interface_number)
        .wait()
        .context("Cannot claim DFU interface")?;

    // The backend deadline outlives the engine timeout, so a cancelled
    // transfer still completes in bounded time.
    let transport = Arc::new(NusbTransport::new(interface, config.request_timeout() * 2));
    let bound = DfuDevice::bind(transport, &raw_descriptor, interface_number, pool, config)?;
    run_command(&bound, command)
}

/// Interface number and raw functional descriptor of the first runtime-mode
/// DFU interface.
fn find_runtime_interface(device: &nusb::Device) -> Option<(u8, Vec<u8>)> {
    device.configurations().find_map(|configuration| {
        configuration.interface_alt_settings().find_map(|alt| {
            if alt.class() != DFU_CLASS
                || alt.subclass() != DFU_SUBCLASS
                || alt.protocol() != DFU_PROTOCOL_RUNTIME
            {
                return None;
            }
            let descriptor = alt
                .descriptors()
                .find(|descriptor| descriptor.descriptor_type() == DFU_FUNC_DESC_TYPE)?;
            Some((alt.interface_number(), descriptor.to_vec()))
        })
    })
}

fn run_command(device: &DfuDevice, command: Command) -> Result<()> {
    // Hold the device's serialization lock for the whole sequence.
    let _guard = device.lock();
    match command {
        Command::Status => {
            info!(slot = device.slot(), "{}", device.summary());
            let status = device.get_status()?;
            info!(
                status = status.status,
                state = state_name(status.state),
                poll_timeout_ms = status.poll_timeout,
                "device status"
            );
        }
        Command::State => {
            let state = device.get_state()?;
            info!(state, name = state_name(state), "device state");
        }
        Command::Detach => device.detach()?,
        Command::Clear => device.clear_status()?,
        Command::Abort => device.abort()?,
    }
    Ok(())
}
