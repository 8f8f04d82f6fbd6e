//! Network subsystem
//!
//! Accepts raw TCP clients and forwards their byte streams to the printer.
//!
//! # Architecture
//!
//! ```text
//! ForwardingServer
//!   ├─> bind listener, open device
//!   ├─> accept connections
//!   └─> spawn ClientConnection per client
//!         ├─> read chunks from the socket
//!         ├─> write each chunk via DeviceSink (one writer at a time)
//!         └─> release its in-flight guard on exit
//! ```
//!
//! Stopping closes the listener, waits for every ClientConnection to end,
//! then closes the device.

pub mod connection;
pub mod drain;
pub mod server;
pub(crate) mod sink;

pub use connection::{ClientConnection, READ_BUFFER_SIZE};
pub use drain::{InflightGuard, InflightTracker};
pub use server::ForwardingServer;
