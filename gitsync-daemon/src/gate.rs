//! Global bound on simultaneous sync executions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::DaemonError;

/// Counting permit pool shared by every per-repository task.
///
/// A permit is released when the returned guard is dropped.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    /// `capacity` is clamped to at least one permit.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free permit.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, DaemonError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DaemonError::ChannelClosed("concurrency gate"))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}
