//! Device port error types

use thiserror::Error;

/// Errors reported by a [`DevicePort`](crate::DevicePort) realization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Operation requires an open device
    #[error("device not open")]
    NotOpen,

    /// `open` called on a device that is already open
    #[error("device already open")]
    AlreadyOpen,

    /// No matching device is attached
    #[error("device not found")]
    NotFound,

    /// The device exposes no interface of the printer class
    #[error("no printer interface found")]
    NoPrinterInterface,

    /// The printer interface has no bulk OUT endpoint
    #[error("cannot find output endpoint from printer")]
    NoOutEndpoint,

    /// The printer interface has no bulk IN endpoint
    #[error("input endpoint not available")]
    NoInEndpoint,

    /// libusb failure
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// The blocking call was abandoned before it completed
    #[error("device call cancelled")]
    Cancelled,

    /// Failure injected by a test port
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Type alias for device results
pub type Result<T> = std::result::Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_error_conversion() {
        let err: DeviceError = rusb::Error::Access.into();
        assert_eq!(err, DeviceError::Usb(rusb::Error::Access));
        assert!(err.to_string().starts_with("USB error"));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(DeviceError::NotOpen.to_string(), "device not open");
        let msg = DeviceError::Injected("open refused".into()).to_string();
        assert!(msg.contains("open refused"));
    }
}
