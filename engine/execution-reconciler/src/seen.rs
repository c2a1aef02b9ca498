//! Bounded recency window of execution ids

use portfolio_types::ExecutionId;
use std::collections::{HashSet, VecDeque};

/// Remembers the most recent execution ids, evicting the oldest first
#[derive(Debug)]
pub struct SeenExecutions {
    capacity: usize,
    order: VecDeque<ExecutionId>,
    ids: HashSet<ExecutionId>,
}

impl SeenExecutions {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, order: VecDeque::with_capacity(capacity), ids: HashSet::with_capacity(capacity) }
    }

    pub fn contains(&self, id: &ExecutionId) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`. Returns false when it was already in the window.
    pub fn insert(&mut self, id: ExecutionId) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
