//! Device port for escpos-usb-bridge
//!
//! Defines the [`DevicePort`] capability the forwarding server writes through,
//! and its two realizations:
//!
//! - [`UsbPrinter`]: a USB printer-class device driven through `rusb`
//! - [`MockPort`]: an in-memory byte sink for tests
//!
//! # Example
//!
//! ```no_run
//! use device::{DevicePort, EventKind, UsbPrinter};
//!
//! # fn main() -> device::Result<()> {
//! let printer = UsbPrinter::discover()?;
//! printer.on(EventKind::Close, |_| println!("printer released"));
//!
//! printer.open()?;
//! printer.write(&[0x1B, 0x40])?; // ESC @
//! printer.close()?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod mock;
pub mod port;
pub mod usb;

pub use error::{DeviceError, Result};
pub use events::{DeviceEvent, EventHandler, EventKind, EventRegistry};
pub use mock::{MockCall, MockPort};
pub use port::DevicePort;
pub use usb::{PrinterInfo, UsbPrinter, find_printers, is_printer, list_printers};
