//! Printer discovery

use rusb::{Context, Device, DeviceHandle, UsbContext};
use tracing::{debug, warn};

use super::IFACE_CLASS_PRINTER;
use crate::error::Result;

/// Summary of an attached printer, for listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterInfo {
    pub bus_number: u8,
    pub device_address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// Whether any alternate setting of the active configuration is a printer
/// interface.
pub fn is_printer<T: UsbContext>(device: &Device<T>) -> bool {
    let config = match device.active_config_descriptor() {
        Ok(config) => config,
        Err(e) => {
            debug!(
                "Cannot read active config of {:03}:{:03}: {}",
                device.bus_number(),
                device.address(),
                e
            );
            return false;
        }
    };

    config.interfaces().any(|interface| {
        interface
            .descriptors()
            .any(|setting| setting.class_code() == IFACE_CLASS_PRINTER)
    })
}

/// All attached printers, in bus enumeration order.
pub fn find_printers<T: UsbContext>(context: &T) -> Result<Vec<Device<T>>> {
    let devices = context.devices()?;

    let printers: Vec<_> = devices
        .iter()
        .filter(|device| {
            let printer = is_printer(device);
            debug!(
                "Found device {:03}:{:03} (printer: {})",
                device.bus_number(),
                device.address(),
                printer
            );
            printer
        })
        .collect();

    debug!("Enumerated {} printer(s)", printers.len());
    Ok(printers)
}

/// Describe every attached printer.
///
/// String descriptors are read on a best-effort basis; a printer we lack
/// permission to open is still listed, without strings.
pub fn list_printers() -> Result<Vec<PrinterInfo>> {
    let context = Context::new()?;
    let printers = find_printers(&context)?;

    let mut infos = Vec::with_capacity(printers.len());
    for device in printers {
        match printer_info(&device) {
            Ok(info) => infos.push(info),
            Err(e) => warn!(
                "Skipping printer {:03}:{:03}: {}",
                device.bus_number(),
                device.address(),
                e
            ),
        }
    }
    Ok(infos)
}

fn printer_info<T: UsbContext>(device: &Device<T>) -> Result<PrinterInfo> {
    let descriptor = device.device_descriptor()?;

    let (manufacturer, product, serial_number) = match device.open() {
        Ok(handle) => read_strings(&handle, &descriptor),
        Err(e) => {
            debug!("Cannot open printer to read strings: {}", e);
            (None, None, None)
        }
    };

    Ok(PrinterInfo {
        bus_number: device.bus_number(),
        device_address: device.address(),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        manufacturer,
        product,
        serial_number,
    })
}

fn read_strings<T: UsbContext>(
    handle: &DeviceHandle<T>,
    descriptor: &rusb::DeviceDescriptor,
) -> (Option<String>, Option<String>, Option<String>) {
    (
        handle.read_manufacturer_string_ascii(descriptor).ok(),
        handle.read_product_string_ascii(descriptor).ok(),
        handle.read_serial_number_string_ascii(descriptor).ok(),
    )
}

/// Serial number of `device`, if it can be opened and reports one.
pub(crate) fn serial_number<T: UsbContext>(device: &Device<T>) -> Option<String> {
    let descriptor = device.device_descriptor().ok()?;
    let handle = device.open().ok()?;
    handle.read_serial_number_string_ascii(&descriptor).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_printers_only_returns_printers() {
        // Needs libusb and bus access; absent in most CI sandboxes.
        let Ok(context) = Context::new() else {
            eprintln!("USB context unavailable, skipping");
            return;
        };

        match find_printers(&context) {
            Ok(printers) => {
                for printer in &printers {
                    assert!(is_printer(printer));
                }
            }
            Err(e) => eprintln!("USB enumeration failed (expected without permissions): {}", e),
        }
    }
}
