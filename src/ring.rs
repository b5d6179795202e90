//! Fixed-capacity FIFO ring buffer with oldest-first eviction
//!
//! Each buffer has exactly one writer (its owning component) and any number
//! of readers. Under the cooperative scheduler no lock is needed as long as
//! the owner finishes a push before yielding; components shared across tasks
//! wrap their buffers in a mutex with bounded critical sections.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` entries. A zero capacity
    /// is bumped to 1 so a push always lands.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest if the buffer is full.
    /// Returns the evicted entry, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate entries oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Most recent `n` entries, oldest first within the slice
    pub fn recent(&self, n: usize) -> Vec<&T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
