//! pendrive
//!
//! Runs the USB core on libusb hot-plug events with the pendrive driver
//! registered, until interrupted.

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use pendrive::config::DriverConfig;
use pendrive::{DriverModule, MODULE_INFO, PENDRIVE_ID_TABLE, module_init_status};
use tokio::signal;
use tracing::{error, info};
use usbcore::id::table_entries;
use usbcore::{CoreBridge, UsbCore, create_core_bridge, setup_logging, spawn_core_thread};

#[derive(Parser, Debug)]
#[command(name = "pendrive")]
#[command(author, version, about = "USB flash drive interface driver")]
#[command(long_about = "
Registers the pendrive interface driver with a userspace USB core fed by
libusb hot-plug events, and logs when a supported flash drive is plugged in
or removed.

EXAMPLES:
    # Run with default config
    pendrive

    # Show the device ID table and module aliases
    pendrive --list-table

    # List connected devices and the drivers bound to them
    pendrive --list-devices

    # Run with debug logging
    pendrive --log-level debug

CONFIGURATION:
    The configuration is looked up in the following order:
    1. Path specified with --config
    2. ~/.config/pendrive/pendrive.toml
    3. /etc/pendrive/pendrive.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Print the device ID table and exit
    #[arg(long)]
    list_table: bool,

    /// List connected USB devices and their bindings, then exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = DriverConfig::default();
        let path = DriverConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    if args.list_table {
        print_id_table();
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        DriverConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        DriverConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.driver.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("pendrive v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let core = UsbCore::shared();
    let (bridge, worker) = create_core_bridge();
    let core_thread = spawn_core_thread(worker, core.clone(), config.usb.core_settings())
        .context("Failed to start USB core")?;

    let result = run_driver(DriverModule::new(core), &bridge, args.list_devices).await;

    info!("Shutting down USB core...");
    if let Err(e) = bridge.shutdown().await {
        error!("Error shutting down USB core: {:#}", e);
    }
    match core_thread.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB core thread failed: {}", e),
        Err(e) => error!("USB core thread panicked: {:?}", e),
    }

    result
}

/// Print the ID table with its module aliases
fn print_id_table() {
    println!(
        "{} ({}, license {})",
        MODULE_INFO.name, MODULE_INFO.description, MODULE_INFO.license
    );
    for id in table_entries(&PENDRIVE_ID_TABLE) {
        println!("  {}  alias {}", id.identity(), id.modalias());
    }
}

/// List devices known to the core and exit
async fn list_devices_mode(bridge: &CoreBridge) -> Result<()> {
    let devices = bridge
        .list_devices()
        .await
        .context("Failed to list devices")?;

    if devices.is_empty() {
        println!("No USB devices found.");
        return Ok(());
    }

    println!("Found {} USB device(s):\n", devices.len());
    for summary in devices {
        let device = &summary.device;
        println!(
            "  Bus {:03} Device {:03}: ID {}",
            device.bus, device.address, device.identity
        );
        for interface in &device.interfaces {
            let driver = summary
                .bindings
                .iter()
                .find(|(number, _)| *number == interface.number)
                .map_or("(none)", |(_, driver)| *driver);
            println!(
                "      Interface {} class {:02x}/{:02x}/{:02x} driver {}",
                interface.number, interface.class, interface.subclass, interface.protocol, driver
            );
        }
    }

    Ok(())
}

/// Load the driver, then either list devices or wait for Ctrl+C
///
/// The driver is registered in both modes so the listing shows which
/// interfaces it claimed.
async fn run_driver(mut module: DriverModule, bridge: &CoreBridge, list_only: bool) -> Result<()> {
    let init = module.module_init();
    let status = module_init_status(&init);
    init.map_err(|e| anyhow!("Driver registration failed with status {}: {}", status, e))?;

    let result = if list_only {
        list_devices_mode(bridge).await
    } else {
        info!("Press Ctrl+C to unload");
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, unloading driver..."),
            Err(e) => error!("Error waiting for Ctrl+C: {}", e),
        }
        Ok(())
    };

    module.module_teardown();
    result
}
