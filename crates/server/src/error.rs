//! Forwarding server error types

use device::DeviceError;
use thiserror::Error;

/// Errors returned by the server's lifecycle commands
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` called while the server is running
    #[error("server already running")]
    AlreadyRunning,

    /// The listen address could not be bound
    #[error("failed to bind {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The device could not be opened; the listener was released
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(#[source] DeviceError),

    /// The device failed to close; the server is stopped regardless
    #[error("failed to close device: {0}")]
    DeviceCloseFailed(#[source] DeviceError),
}

/// Errors that end a single client connection
///
/// These never leave the connection task; they are logged and the socket is
/// closed.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("read from client failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write to device failed: {0}")]
    Write(#[source] DeviceError),

    /// The device accepted fewer bytes than were forwarded. Not retried.
    #[error("short write to device: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_bind_failed_keeps_source() {
        let err = ServerError::BindFailed {
            address: "localhost:9100".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("localhost:9100"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_short_write_display() {
        let err = ConnectionError::ShortWrite {
            written: 4,
            expected: 15,
        };
        assert_eq!(err.to_string(), "short write to device: 4 of 15 bytes");
    }

    #[test]
    fn test_device_errors_are_wrapped() {
        let err = ServerError::DeviceOpenFailed(DeviceError::NotFound);
        assert_eq!(err.to_string(), "failed to open device: device not found");
    }
}
