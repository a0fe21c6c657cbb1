//! Process-wide bound on outbound model calls.
//!
//! One `ModelLimiter` is built at startup and handed to every component that
//! talks to a model backend. Clones share the same permit pool.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default number of concurrent model calls.
pub const DEFAULT_MODEL_PERMITS: usize = 3;

/// A shared permit pool for model calls.
#[derive(Debug, Clone)]
pub struct ModelLimiter {
    semaphore: Arc<Semaphore>,
    permits: usize,
}

impl ModelLimiter {
    /// Create a limiter with `permits` slots (at least one).
    pub fn new(permits: usize) -> Self {
        let permits = permits.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permits,
        }
    }

    /// Wait for a free slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        // The semaphore is never closed, so acquisition cannot fail.
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => unreachable!("model limiter semaphore closed"),
        }
    }

    /// Total slots in the pool.
    pub fn permits(&self) -> usize {
        self.permits
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ModelLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MODEL_PERMITS)
    }
}
