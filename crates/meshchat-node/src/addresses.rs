//! Known addresses: `host:port` strings learned through gossip.
//!
//! Kept in first-heard order, which is the order repair walks them in.
//! Never pruned. The mutex is only held for the duration of a single
//! push or copy and never across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct KnownAddresses {
    inner: Arc<Mutex<Vec<String>>>,
}

impl KnownAddresses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an address. Returns true if it was new.
    pub fn add(&self, addr: &str) -> bool {
        let addr = addr.trim();
        if addr.is_empty() {
            return false;
        }
        let mut list = self.lock();
        if list.iter().any(|known| known == addr) {
            return false;
        }
        list.push(addr.to_owned());
        true
    }

    pub fn contains(&self, addr: &str) -> bool {
        self.lock().iter().any(|known| known == addr)
    }

    /// Copy of every address in gossip order.
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
