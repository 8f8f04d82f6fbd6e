//! The capability interface the forwarding server drives

use crate::error::Result;

/// Narrow interface to a single output device.
///
/// Methods take `&self`; realizations guard their own state so a port can be
/// shared as `Arc<dyn DevicePort>` between the process that built it and the
/// server that drives it. Every call may block on hardware, so async callers
/// should run them on a blocking thread.
pub trait DevicePort: Send + Sync {
    /// Acquire the device. Fails if it is already open.
    fn open(&self) -> Result<()>;

    /// Write `data`, returning how many bytes the device accepted.
    ///
    /// A count smaller than `data.len()` is a short write; callers decide
    /// whether that is an error.
    fn write(&self, data: &[u8]) -> Result<usize>;

    /// Read device-to-host bytes into `buf`.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Release the device. Closing a closed device is a no-op.
    fn close(&self) -> Result<()>;

    /// Whether the device is currently open.
    fn is_open(&self) -> bool;
}
