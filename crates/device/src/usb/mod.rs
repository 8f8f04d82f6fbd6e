//! USB printer realization of the device port
//!
//! Discovery scans the bus for devices exposing an interface of the printer
//! class; [`UsbPrinter`] claims that interface and talks to its bulk
//! endpoints. Nothing here is visible to the forwarding server beyond the
//! [`DevicePort`](crate::DevicePort) trait.

pub mod discovery;
pub mod printer;

pub use discovery::{PrinterInfo, find_printers, is_printer, list_printers};
pub use printer::UsbPrinter;

/// USB interface class code for printers
pub const IFACE_CLASS_PRINTER: u8 = 0x07;
