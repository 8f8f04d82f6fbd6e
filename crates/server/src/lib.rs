//! escpos-usb-bridge server library
//!
//! Exposes the forwarding server so it can be embedded and tested apart from
//! the `escpos-usb-server` binary.

pub mod config;
pub mod error;
pub mod network;
pub mod service;

pub use config::{PrinterSelector, ServerConfig};
pub use error::{ConnectionError, ServerError};
pub use network::ForwardingServer;
