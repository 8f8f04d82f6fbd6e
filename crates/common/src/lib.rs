//! Common utilities for escpos-usb-bridge
//!
//! Shared between the device and server crates: the common error type,
//! tracing setup, and helpers for async and socket-level tests.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
