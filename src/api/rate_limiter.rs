//! Per-host request spacing for the HTTP transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

/// Per-host rate limiter.
///
/// Ensures that requests to any single host are spaced at least
/// `1 / per_second` apart. Callers for the same host queue up behind each
/// other; different hosts never block each other.
#[derive(Debug)]
pub struct HostRateLimiter {
    interval: Duration,
    slots: RwLock<HashMap<String, Arc<Mutex<Option<Instant>>>>>,
}

impl HostRateLimiter {
    /// Create a limiter allowing `per_second` requests per host.
    ///
    /// A value of zero is treated as one.
    #[must_use]
    pub fn new(per_second: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / per_second.max(1),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Minimum spacing between two requests to the same host.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a request to `host` is allowed, then claim the slot.
    pub async fn acquire(&self, host: &str) {
        let slot = self.get_or_create_slot(host).await;
        let mut last = slot.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }

    async fn get_or_create_slot(&self, host: &str) -> Arc<Mutex<Option<Instant>>> {
        // Fast path: slot exists
        {
            let read_guard = self.slots.read().await;
            if let Some(slot) = read_guard.get(host) {
                return Arc::clone(slot);
            }
        }

        let mut write_guard = self.slots.write().await;
        // Another caller may have created it between the two locks
        if let Some(slot) = write_guard.get(host) {
            return Arc::clone(slot);
        }

        let slot = Arc::new(Mutex::new(None));
        write_guard.insert(host.to_string(), Arc::clone(&slot));
        slot
    }

    /// Number of hosts currently tracked.
    pub async fn host_count(&self) -> usize {
        self.slots.read().await.len()
    }
}
