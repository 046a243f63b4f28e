//! The single active configuration snapshot.

use std::sync::Arc;

use gitsync_core::SyncConfig;
use tokio::sync::RwLock;

/// Atomically replaceable `Arc<SyncConfig>`.
///
/// Readers clone the `Arc` and work from that snapshot; the write lock is
/// held only for the pointer swap.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    current: Arc<RwLock<Arc<SyncConfig>>>,
}

impl LiveConfig {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub async fn snapshot(&self) -> Arc<SyncConfig> {
        Arc::clone(&*self.current.read().await)
    }

    /// Install `config`, returning the snapshot it replaced.
    pub async fn swap(&self, config: SyncConfig) -> Arc<SyncConfig> {
        let next = Arc::new(config);
        let mut guard = self.current.write().await;
        std::mem::replace(&mut *guard, next)
    }
}
