//! Presence table: who has been heard from recently.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Nickname → last time an ONLINE or LOGIN for it arrived.
#[derive(Clone, Default)]
pub struct PresenceTable {
    seen: Arc<DashMap<String, Instant>>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `nickname` as alive now.
    pub fn touch(&self, nickname: &str) {
        if nickname.is_empty() {
            return;
        }
        self.seen.insert(nickname.to_owned(), Instant::now());
    }

    pub fn remove(&self, nickname: &str) -> bool {
        self.seen.remove(nickname).is_some()
    }

    /// Drop every nickname silent for longer than `max_age`. Returns how
    /// many were dropped.
    pub fn evict_stale(&self, max_age: Duration) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, last| last.elapsed() <= max_age);
        before.saturating_sub(self.seen.len())
    }

    pub fn contains(&self, nickname: &str) -> bool {
        self.seen.contains_key(nickname)
    }

    /// Sorted nicknames.
    pub fn snapshot(&self) -> Vec<String> {
        let mut nicks: Vec<String> = self.seen.iter().map(|e| e.key().clone()).collect();
        nicks.sort();
        nicks
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
