//! Local block list. Never leaves this node.

use std::sync::Arc;

use dashmap::DashSet;

#[derive(Clone, Default)]
pub struct BlockList {
    nicks: Arc<DashSet<String>>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `nickname` was already blocked.
    pub fn block(&self, nickname: &str) -> bool {
        self.nicks.insert(nickname.trim().to_owned())
    }

    /// Returns false if `nickname` was not blocked.
    pub fn unblock(&self, nickname: &str) -> bool {
        self.nicks.remove(nickname.trim()).is_some()
    }

    pub fn is_blocked(&self, nickname: &str) -> bool {
        self.nicks.contains(nickname)
    }

    /// Sorted blocked nicknames.
    pub fn snapshot(&self) -> Vec<String> {
        let mut nicks: Vec<String> = self.nicks.iter().map(|n| n.key().clone()).collect();
        nicks.sort();
        nicks
    }
}
