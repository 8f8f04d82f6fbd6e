//! In-flight task accounting for graceful drain

use std::sync::Arc;
use tokio::sync::watch;

/// Counts live tasks and lets a stopper wait for the count to reach zero.
///
/// Each task holds an [`InflightGuard`]; dropping the guard decrements the
/// count, so every exit path of a task is accounted for exactly once.
#[derive(Debug, Clone)]
pub struct InflightTracker {
    count: Arc<watch::Sender<usize>>,
}

impl InflightTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            count: Arc::new(count),
        }
    }

    /// Register a new task.
    pub fn enter(&self) -> InflightGuard {
        self.count.send_modify(|n| *n += 1);
        InflightGuard {
            count: Arc::clone(&self.count),
        }
    }

    /// Tasks currently registered
    pub fn count(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once no task is registered.
    pub async fn drained(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl Default for InflightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Membership of one task in an [`InflightTracker`]
#[derive(Debug)]
pub struct InflightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|n| *n -= 1);
    }
}
