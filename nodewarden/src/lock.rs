//! Per-node exclusive sections

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed mutexes, one per node id
///
/// Node ids are unique host-wide, so the id alone is the key.
#[derive(Default)]
pub struct NodeLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `node_id`
    pub async fn lock(&self, node_id: &str) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(node_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        mutex.lock_owned().await
    }

    /// Drop the entry of a deleted node if nobody else holds or awaits it
    pub fn forget(&self, node_id: &str) {
        self.locks
            .remove_if(node_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
