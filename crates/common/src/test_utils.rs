//! Test utilities for escpos-usb-bridge
//!
//! Helpers shared by the unit and integration tests of every crate: bounded
//! waits for async work, free loopback ports, and deterministic payloads.
//!
//! # Example
//!
//! ```
//! use common::test_utils::create_mock_payload;
//!
//! let payload = create_mock_payload(300);
//! assert_eq!(payload[256], 0);
//! ```

use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between checks in [`wait_until`]
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run a future with a timeout
///
/// ```
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// # async fn example() {
/// let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await.unwrap();
/// assert_eq!(result, 42);
/// # }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Poll `condition` until it holds or `duration` elapses.
///
/// Returns `true` if the condition was observed. Used where the observable
/// effect of network I/O lands on another task, e.g. bytes reaching a mock
/// device after a client write.
pub async fn wait_until<F>(duration: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}

/// Reserve a loopback address with a currently free port.
///
/// The probe listener is dropped before returning, so the port is free for
/// the caller to bind, but another process could grab it in between.
pub fn free_local_addr() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .unwrap_or_else(|e| panic!("failed to reserve a loopback port: {}", e))
}

/// Deterministic payload of `size` bytes counting 0..=255 and wrapping.
pub fn create_mock_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// A short ESC/POS job: initialize, a line of text, feed and partial cut.
pub fn create_escpos_job(text: &str) -> Vec<u8> {
    let mut job = vec![0x1B, 0x40]; // ESC @
    job.extend_from_slice(text.as_bytes());
    job.push(b'\n');
    job.extend_from_slice(&[0x1B, 0x64, 0x03]); // ESC d 3
    job.extend_from_slice(&[0x1D, 0x56, 0x01]); // GS V 1
    job
}
