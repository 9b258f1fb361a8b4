//! Seen-id sets: the deduplication memory of a node.
//!
//! Each set maps a packet id to the instant it was first recorded.
//! `insert` is an atomic check-and-insert on the map shard, so two tasks
//! racing on the same id cannot both see it as new. Ids are forgotten once
//! they are older than the retention window and `prune` runs.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

/// Concurrent, time-windowed set of packet ids.
#[derive(Clone)]
pub struct SeenSet {
    ids: Arc<DashMap<u64, Instant>>,
    window: Duration,
}

impl SeenSet {
    pub fn new(window: Duration) -> Self {
        Self {
            ids: Arc::new(DashMap::new()),
            window,
        }
    }

    /// Record `id`. Returns true if it was not already present.
    pub fn insert(&self, id: u64) -> bool {
        match self.ids.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                true
            }
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop ids recorded more than one window ago. Returns how many went.
    pub fn prune(&self) -> usize {
        let before = self.ids.len();
        let window = self.window;
        self.ids.retain(|_, seen| seen.elapsed() <= window);
        before.saturating_sub(self.ids.len())
    }
}
