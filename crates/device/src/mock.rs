//! In-memory device port for tests.
//!
//! `MockPort` accepts every write into memory and records each call, so tests
//! can assert exactly what a caller sent, in which order, and how the calls
//! were chunked. Failures, short writes and slow writes can be injected to
//! drive error and concurrency paths without hardware.
//!
//! ```
//! use device::{DevicePort, MockPort};
//!
//! let port = MockPort::new();
//! port.open().unwrap();
//! port.write(b"Hello").unwrap();
//! assert_eq!(port.written(), b"Hello");
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::{DeviceError, Result};
use crate::port::DevicePort;

/// One recorded call against the port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open,
    /// Bytes accepted by a write call
    Write(Vec<u8>),
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    calls: Vec<MockCall>,
    responses: VecDeque<u8>,
    fail_open: bool,
    fail_close: bool,
    fail_write: bool,
    short_write: Option<usize>,
    write_delay: Option<Duration>,
}

/// In-memory byte sink implementing [`DevicePort`]
#[derive(Debug, Default)]
pub struct MockPort {
    state: Mutex<MockState>,
    active_writes: AtomicUsize,
    max_concurrent_writes: AtomicUsize,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make subsequent `open` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Make subsequent `close` calls fail. The port still ends up closed.
    pub fn set_fail_close(&self, fail: bool) {
        self.lock().fail_close = fail;
    }

    /// Make subsequent `write` calls fail without accepting any bytes.
    pub fn set_fail_write(&self, fail: bool) {
        self.lock().fail_write = fail;
    }

    /// Accept at most `limit` bytes per write call.
    pub fn set_short_write(&self, limit: Option<usize>) {
        self.lock().short_write = limit;
    }

    /// Sleep for `delay` inside every write call, outside the state lock.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.lock().write_delay = delay;
    }

    /// Queue bytes to be returned by `read`.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.lock().responses.extend(bytes);
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Payload of each write call, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// All accepted bytes, concatenated in call order
    pub fn written(&self) -> Vec<u8> {
        self.writes().concat()
    }

    /// Total number of accepted bytes
    pub fn written_len(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .map(|call| match call {
                MockCall::Write(bytes) => bytes.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn open_calls(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Open))
    }

    pub fn close_calls(&self) -> usize {
        self.count(|call| matches!(call, MockCall::Close))
    }

    /// Highest number of write calls ever observed in flight at once
    pub fn max_concurrent_writes(&self) -> usize {
        self.max_concurrent_writes.load(Ordering::SeqCst)
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| pred(call)).count()
    }
}

impl DevicePort for MockPort {
    fn open(&self) -> Result<()> {
        let mut state = self.lock();
        if state.open {
            return Err(DeviceError::AlreadyOpen);
        }
        if state.fail_open {
            return Err(DeviceError::Injected("open refused".to_string()));
        }
        state.open = true;
        state.calls.push(MockCall::Open);
        Ok(())
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        let active = self.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent_writes.fetch_max(active, Ordering::SeqCst);

        let delay = self.lock().write_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let result = {
            let mut state = self.lock();
            if !state.open {
                Err(DeviceError::NotOpen)
            } else if state.fail_write {
                Err(DeviceError::Injected("write refused".to_string()))
            } else {
                let accepted = state.short_write.map_or(data.len(), |cap| cap.min(data.len()));
                state.calls.push(MockCall::Write(data[..accepted].to_vec()));
                Ok(accepted)
            }
        };

        self.active_writes.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.lock();
        if !state.open {
            return Err(DeviceError::NotOpen);
        }
        let n = buf.len().min(state.responses.len());
        for (slot, byte) in buf.iter_mut().zip(state.responses.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Ok(());
        }
        state.open = false;
        state.calls.push(MockCall::Close);
        if state.fail_close {
            return Err(DeviceError::Injected("close refused".to_string()));
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_open_twice_fails() {
        let port = MockPort::new();
        port.open().unwrap();
        assert_eq!(port.open(), Err(DeviceError::AlreadyOpen));
        assert_eq!(port.open_calls(), 1);
    }

    #[test]
    fn test_write_requires_open() {
        let port = MockPort::new();
        assert_eq!(port.write(b"x"), Err(DeviceError::NotOpen));
        assert!(port.calls().is_empty());
    }

    #[test]
    fn test_writes_are_recorded_per_call() {
        let port = MockPort::new();
        port.open().unwrap();
        port.write(b"ab").unwrap();
        port.write(b"c").unwrap();

        assert_eq!(port.writes(), vec![b"ab".to_vec(), b"c".to_vec()]);
        assert_eq!(port.written(), b"abc");
        assert_eq!(port.written_len(), 3);
    }

    #[test]
    fn test_short_write_truncates() {
        let port = MockPort::new();
        port.open().unwrap();
        port.set_short_write(Some(2));

        assert_eq!(port.write(b"hello").unwrap(), 2);
        assert_eq!(port.written(), b"he");
    }

    #[test]
    fn test_failed_close_still_closes() {
        let port = MockPort::new();
        port.open().unwrap();
        port.set_fail_close(true);

        assert!(port.close().is_err());
        assert!(!port.is_open());
        // Closing a closed port is a no-op, even with failure injected
        assert!(port.close().is_ok());
        assert_eq!(port.close_calls(), 1);
    }

    #[test]
    fn test_fail_open_leaves_closed() {
        let port = MockPort::new();
        port.set_fail_open(true);
        assert!(matches!(port.open(), Err(DeviceError::Injected(_))));
        assert!(!port.is_open());
        assert_eq!(port.open_calls(), 0);
    }

    #[test]
    fn test_read_drains_queued_response() {
        let port = MockPort::new();
        port.open().unwrap();
        port.queue_response(&[0x10, 0x04, 0x01]);

        let mut buf = [0u8; 2];
        assert_eq!(port.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [0x10, 0x04]);
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0x01);
        assert_eq!(port.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_writes_are_counted() {
        let port = Arc::new(MockPort::new());
        port.open().unwrap();
        port.set_write_delay(Some(Duration::from_millis(200)));

        let handles: Vec<_> = (0..2u8)
            .map(|i| {
                let port = port.clone();
                std::thread::spawn(move || port.write(&[i]).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(port.max_concurrent_writes(), 2);
        assert_eq!(port.written_len(), 2);
    }
}
