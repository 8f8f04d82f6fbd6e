//! USB printer device port
//!
//! Wraps a `rusb::Device` that exposes a printer-class interface. Opening
//! claims that interface (detaching the kernel `usblp` driver where one is
//! bound) and picks its bulk endpoints; closing releases the interface and
//! hands the device back to the kernel.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};
use tracing::{debug, info, warn};

use super::IFACE_CLASS_PRINTER;
use super::discovery::{find_printers, serial_number};
use crate::error::{DeviceError, Result};
use crate::events::{DeviceEvent, EventKind, EventRegistry};
use crate::port::DevicePort;

/// Default bulk OUT timeout. Printers stall writes while feeding paper.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bulk IN timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Printer interface located in the active configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PrinterInterface {
    number: u8,
    setting: u8,
    out_endpoint: Option<u8>,
    in_endpoint: Option<u8>,
}

/// State held while the device is open
struct OpenPrinter {
    handle: DeviceHandle<Context>,
    interface: u8,
    out_endpoint: u8,
    in_endpoint: Option<u8>,
    /// We detached a kernel driver and must reattach it on close
    kernel_driver_detached: bool,
}

/// A USB thermal printer
pub struct UsbPrinter {
    device: Device<Context>,
    write_timeout: Duration,
    read_timeout: Duration,
    state: Mutex<Option<OpenPrinter>>,
    events: EventRegistry,
}

impl UsbPrinter {
    /// Wrap a specific device. Does not open it.
    pub fn from_device(device: Device<Context>) -> Self {
        Self {
            device,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            state: Mutex::new(None),
            events: EventRegistry::new(),
        }
    }

    /// Use the first printer found on the bus.
    pub fn discover() -> Result<Self> {
        let context = Context::new()?;
        let device = find_printers(&context)?
            .into_iter()
            .next()
            .ok_or(DeviceError::NotFound)?;

        info!(
            "Using printer at bus {:03} address {:03}",
            device.bus_number(),
            device.address()
        );
        Ok(Self::from_device(device))
    }

    /// Use the device with the given vendor/product IDs, falling back to the
    /// first printer found when no device matches.
    pub fn with_vid_pid(vendor_id: u16, product_id: u16) -> Result<Self> {
        let context = Context::new()?;
        let matched = context.devices()?.iter().find(|device| {
            device
                .device_descriptor()
                .map(|d| d.vendor_id() == vendor_id && d.product_id() == product_id)
                .unwrap_or(false)
        });

        match matched {
            Some(device) => {
                info!("Using printer {:04x}:{:04x}", vendor_id, product_id);
                Ok(Self::from_device(device))
            }
            None => {
                warn!(
                    "No device {:04x}:{:04x}, falling back to first printer",
                    vendor_id, product_id
                );
                Self::discover()
            }
        }
    }

    /// Use the printer reporting the given serial number.
    pub fn with_serial(serial: &str) -> Result<Self> {
        let context = Context::new()?;
        let device = find_printers(&context)?
            .into_iter()
            .find(|device| serial_number(device).as_deref() == Some(serial))
            .ok_or(DeviceError::NotFound)?;

        info!("Using printer with serial {}", serial);
        Ok(Self::from_device(device))
    }

    /// Override the bulk transfer timeouts. `Duration::ZERO` waits forever.
    pub fn with_timeouts(mut self, write_timeout: Duration, read_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self.read_timeout = read_timeout;
        self
    }

    /// Register an event handler. See [`crate::events`] for delivery rules.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler);
    }

    /// The underlying USB device
    pub fn device(&self) -> &Device<Context> {
        &self.device
    }

    fn lock_state(&self) -> MutexGuard<'_, Option<OpenPrinter>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit `Disconnect` when a transfer failed because the device is gone.
    fn check_disconnect(&self, error: &rusb::Error) {
        if *error == rusb::Error::NoDevice {
            warn!("Printer disconnected");
            self.events.emit(&DeviceEvent::new(EventKind::Disconnect));
        }
    }
}

impl DevicePort for UsbPrinter {
    fn open(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.is_some() {
            return Err(DeviceError::AlreadyOpen);
        }

        let iface = find_printer_interface(&self.device)?;
        let out_endpoint = iface.out_endpoint.ok_or(DeviceError::NoOutEndpoint)?;

        let mut handle = self.device.open()?;

        let kernel_driver_detached = match handle.kernel_driver_active(iface.number) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", iface.number);
                handle.detach_kernel_driver(iface.number)?;
                true
            }
            Ok(false) => false,
            Err(e) => {
                // NotSupported off Linux
                debug!("Cannot query kernel driver on interface {}: {}", iface.number, e);
                false
            }
        };

        if let Err(e) = claim(&mut handle, iface) {
            warn!("Failed to claim printer interface {}: {}", iface.number, e);
            if kernel_driver_detached {
                let _ = handle.attach_kernel_driver(iface.number);
            }
            return Err(e.into());
        }

        debug!(
            "Claimed interface {} (out {:#04x}, in {:?})",
            iface.number, out_endpoint, iface.in_endpoint
        );

        *state = Some(OpenPrinter {
            handle,
            interface: iface.number,
            out_endpoint,
            in_endpoint: iface.in_endpoint,
            kernel_driver_detached,
        });
        drop(state);

        if kernel_driver_detached {
            self.events.emit(&DeviceEvent::new(EventKind::Detach));
        }
        self.events.emit(&DeviceEvent::new(EventKind::Connect));
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        let state = self.lock_state();
        let printer = state.as_ref().ok_or(DeviceError::NotOpen)?;

        let result = printer
            .handle
            .write_bulk(printer.out_endpoint, data, self.write_timeout);
        drop(state);

        match result {
            Ok(written) => {
                self.events.emit_data(&data[..written]);
                Ok(written)
            }
            Err(e) => {
                self.check_disconnect(&e);
                Err(e.into())
            }
        }
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let state = self.lock_state();
        let printer = state.as_ref().ok_or(DeviceError::NotOpen)?;
        let endpoint = printer.in_endpoint.ok_or(DeviceError::NoInEndpoint)?;

        let result = printer.handle.read_bulk(endpoint, buf, self.read_timeout);
        drop(state);

        result.map_err(|e| {
            self.check_disconnect(&e);
            e.into()
        })
    }

    fn close(&self) -> Result<()> {
        let Some(mut printer) = self.lock_state().take() else {
            return Ok(());
        };

        let released = printer.handle.release_interface(printer.interface);
        if let Err(e) = &released {
            warn!("Failed to release interface {}: {}", printer.interface, e);
        }

        if printer.kernel_driver_detached {
            if let Err(e) = printer.handle.attach_kernel_driver(printer.interface) {
                debug!("Could not reattach kernel driver: {}", e);
            }
        }
        drop(printer);

        self.events.emit(&DeviceEvent::new(EventKind::Close));
        released.map_err(Into::into)
    }

    fn is_open(&self) -> bool {
        self.lock_state().is_some()
    }
}

impl Drop for UsbPrinter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing printer on drop: {}", e);
        }
    }
}

fn claim(handle: &mut DeviceHandle<Context>, iface: PrinterInterface) -> rusb::Result<()> {
    handle.claim_interface(iface.number)?;
    if iface.setting != 0 {
        if let Err(e) = handle.set_alternate_setting(iface.number, iface.setting) {
            let _ = handle.release_interface(iface.number);
            return Err(e);
        }
    }
    Ok(())
}

/// Locate the first printer-class alternate setting and its bulk endpoints.
fn find_printer_interface<T: UsbContext>(device: &Device<T>) -> Result<PrinterInterface> {
    let config = device.active_config_descriptor()?;

    for interface in config.interfaces() {
        for setting in interface.descriptors() {
            if setting.class_code() != IFACE_CLASS_PRINTER {
                continue;
            }

            let mut found = PrinterInterface {
                number: setting.interface_number(),
                setting: setting.setting_number(),
                out_endpoint: None,
                in_endpoint: None,
            };

            for endpoint in setting.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }
                match endpoint.direction() {
                    Direction::Out if found.out_endpoint.is_none() => {
                        found.out_endpoint = Some(endpoint.address());
                    }
                    Direction::In if found.in_endpoint.is_none() => {
                        found.in_endpoint = Some(endpoint.address());
                    }
                    _ => {}
                }
            }

            return Ok(found);
        }
    }

    Err(DeviceError::NoPrinterInterface)
}
