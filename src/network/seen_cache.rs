use std::collections::{HashSet, VecDeque};

pub const DEFAULT_SEEN_CAPACITY: usize = 10_000;

/// Bounded record of block and transaction hashes already relayed.
/// Oldest entries are forgotten first.
pub struct SeenCache {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashSet<String>,
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_CAPACITY)
    }
}

impl SeenCache {
    pub fn new(capacity: usize) -> SeenCache {
        SeenCache {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            entries: HashSet::new(),
        }
    }

    /// Record `key`; true if it had not been seen before
    pub fn insert(&mut self, key: &str) -> bool {
        if self.entries.contains(key) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.to_string());
        self.entries.insert(key.to_string());
        true
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
