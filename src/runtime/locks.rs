/// Per-request mutual exclusion
///
/// Transitions on the same request id are serialized through one async
/// mutex per id; different ids never contend. The map is lazily populated
/// (read-lock fast path, write-lock double check) and idle entries are
/// pruned once no caller holds them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Debug, Default)]
pub struct RequestLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `request_id`
    pub async fn acquire(&self, request_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(request_id).await.lock_owned().await
    }

    async fn lock_for(&self, request_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(request_id) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.locks.write().await;
        Arc::clone(
            locks
                .entry(request_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Drop the entry for `request_id` if nobody else holds or waits on it
    pub async fn release(&self, request_id: &str) {
        let mut locks = self.locks.write().await;
        if let Some(lock) = locks.get(request_id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(request_id);
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }
}
