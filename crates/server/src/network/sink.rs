//! Serialized access to the shared device port

use std::sync::Arc;

use device::{DeviceError, DevicePort};
use tokio::sync::Mutex;

use crate::error::ConnectionError;

/// Run a device call on the blocking pool.
///
/// Device calls may block on hardware for as long as the transfer timeout,
/// which must not stall the async workers serving other clients.
pub(crate) async fn run_blocking<T, F>(device: &Arc<dyn DevicePort>, op: F) -> device::Result<T>
where
    F: FnOnce(&dyn DevicePort) -> device::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let device = Arc::clone(device);
    match tokio::task::spawn_blocking(move || op(device.as_ref())).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => Err(DeviceError::Cancelled),
    }
}

/// Write path into the device shared by every connection task.
///
/// One lock guards every write call, so the bytes of one call are never
/// interleaved with another connection's bytes.
#[derive(Clone)]
pub(crate) struct DeviceSink {
    device: Arc<dyn DevicePort>,
    write_lock: Arc<Mutex<()>>,
}

impl DeviceSink {
    pub(crate) fn new(device: Arc<dyn DevicePort>) -> Self {
        Self {
            device,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Forward `chunk` in a single device write.
    ///
    /// A short write is reported as [`ConnectionError::ShortWrite`] and the
    /// remainder is not retried.
    pub(crate) async fn write(&self, chunk: &[u8]) -> Result<usize, ConnectionError> {
        let expected = chunk.len();
        let data = chunk.to_vec();

        let _serialized = self.write_lock.lock().await;
        let written = run_blocking(&self.device, move |device| device.write(&data))
            .await
            .map_err(ConnectionError::Write)?;

        if written < expected {
            return Err(ConnectionError::ShortWrite { written, expected });
        }
        Ok(written)
    }
}
