//! Fixed-capacity ring buffer
//!
//! Storage is allocated once at construction. Once full, every push
//! overwrites the oldest element.

/// Owned ring buffer with a fixed capacity
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: Vec<T>,
    capacity: usize,
    /// Slot the next push writes to once the buffer is full
    head: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A zero capacity is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append a value, evicting the oldest one when full
    pub fn push(&mut self, value: T) {
        if self.items.len() < self.capacity {
            self.items.push(value);
        } else {
            self.items[self.head] = value;
            self.head = (self.head + 1) % self.capacity;
        }
    }

    /// Most recently pushed value
    pub fn latest(&self) -> Option<&T> {
        self.get_back(0)
    }

    /// Value pushed `back` pushes ago (0 = latest)
    pub fn get_back(&self, back: usize) -> Option<&T> {
        let len = self.items.len();
        if back >= len {
            return None;
        }
        let newest = if len < self.capacity {
            len - 1
        } else {
            (self.head + self.capacity - 1) % self.capacity
        };
        let idx = (newest + self.capacity - back) % self.capacity;
        self.items.get(idx)
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (newer, older) = self.items.split_at(self.head.min(self.items.len()));
        older.iter().chain(newer.iter())
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

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.head = 0;
    }
}
