//! escpos-usb-bridge Server
//!
//! Exposes a USB thermal printer as a raw TCP print port: every byte a
//! client sends is written to the printer unchanged.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use device::{DevicePort, EventKind, UsbPrinter};
use server::config::{self, PrinterSelector, ServerConfig};
use server::{ForwardingServer, service};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "escpos-usb-server")]
#[command(
    author,
    version,
    about = "ESC/POS bridge - Forward raw TCP print jobs to a USB printer"
)]
#[command(long_about = "
Listens for raw TCP connections (the port 9100 print protocol) and writes
every byte received to a USB thermal printer, unmodified.

EXAMPLES:
    # Run with default config (localhost:9100, first printer found)
    escpos-usb-server

    # Listen on all interfaces
    escpos-usb-server --address 0.0.0.0:9100

    # List attached printers without starting the server
    escpos-usb-server --list-printers

    # Run with debug logging
    escpos-usb-server --log-level debug

CONFIGURATION:
    The server looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/escpos-usb-bridge/server.toml
    3. /etc/escpos-usb-bridge/server.toml
    4. Built-in defaults

    SERVER_ADDRESS overrides the configured listen address.
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Listen address (host:port), overrides config and SERVER_ADDRESS
    #[arg(short, long, value_name = "ADDR")]
    address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached USB printers and exit
    #[arg(long)]
    list_printers: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = ServerConfig::default();
        let path = ServerConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        ServerConfig::load_or_default()
    };
    config.apply_env();
    if let Some(address) = args.address {
        config.server.address = address;
    }

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("escpos-usb-bridge Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if args.list_printers {
        return list_printers_mode();
    }

    run(config).await
}

/// List attached printers and exit
fn list_printers_mode() -> Result<()> {
    let printers = device::list_printers().context("Failed to enumerate USB devices")?;

    if printers.is_empty() {
        println!("No USB printers found.");
        return Ok(());
    }

    println!("Found {} USB printer(s):\n", printers.len());
    for printer in printers {
        println!(
            "  {:04x}:{:04x} - {} {}",
            printer.vendor_id,
            printer.product_id,
            printer
                .manufacturer
                .as_deref()
                .unwrap_or("Unknown Manufacturer"),
            printer.product.as_deref().unwrap_or("Unknown Product")
        );
        println!(
            "      Bus {:03} Device {:03}",
            printer.bus_number, printer.device_address
        );
        if let Some(serial) = &printer.serial_number {
            println!("      Serial: {}", serial);
        }
        println!();
    }
    Ok(())
}

/// Build the printer described by the `[usb]` section.
fn open_printer(config: &ServerConfig) -> Result<UsbPrinter> {
    let printer = match config.usb.selector()? {
        PrinterSelector::Serial(serial) => UsbPrinter::with_serial(&serial),
        PrinterSelector::VidPid {
            vendor_id,
            product_id,
        } => UsbPrinter::with_vid_pid(vendor_id, product_id),
        PrinterSelector::First => UsbPrinter::discover(),
    }
    .context("Failed to find USB printer")?;

    let printer = printer.with_timeouts(config.usb.write_timeout(), config.usb.read_timeout());
    printer.on(EventKind::Disconnect, |_| warn!("Printer was unplugged"));
    printer.on(EventKind::Close, |_| info!("Printer released"));
    Ok(printer)
}

/// Serve until Ctrl+C, then drain and release the printer
async fn run(config: ServerConfig) -> Result<()> {
    let printer: Arc<dyn DevicePort> = Arc::new(open_printer(&config)?);

    let bridge = ForwardingServer::new(config.server.address.clone(), printer);
    bridge
        .start_async()
        .await
        .context("Failed to start server")?;

    if service::is_systemd() {
        info!("Running under systemd");
    }
    service::notify_ready().context("Failed to notify systemd ready")?;
    service::notify_status(&format!("Forwarding {} to printer", bridge.address()))
        .context("Failed to send status to systemd")?;

    info!("Press Ctrl+C to shutdown");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
        Err(e) => {
            error!("Error waiting for Ctrl+C: {}", e);
        }
    }

    service::notify_stopping().context("Failed to notify systemd stopping")?;

    bridge.stop().await.context("Failed to stop server")?;

    info!("Server shutdown complete");
    Ok(())
}
