//! Fixed-capacity circular buffer.
//!
//! Appends are O(1): once full, each push overwrites the oldest slot in
//! place. Iteration always yields items oldest to newest.

/// Circular buffer holding the most recent `capacity` items.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    /// Index the next push writes to.
    head: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an item, returning the evicted oldest item when full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = self.slots[self.head].replace(item);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        evicted
    }

    /// Items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        let capacity = self.capacity();
        let start = (self.head + capacity - self.len) % capacity;
        (0..self.len).filter_map(move |i| self.slots[(start + i) % capacity].as_ref())
    }

    /// The newest item, if any.
    pub fn latest(&self) -> Option<&T> {
        if self.len == 0 {
            return None;
        }
        let capacity = self.capacity();
        self.slots[(self.head + capacity - 1) % capacity].as_ref()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// The latest `n` items, oldest first.
    pub fn recent(&self, n: usize) -> Vec<T> {
        let skip = self.len.saturating_sub(n);
        self.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}
