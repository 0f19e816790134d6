//! Fixed-capacity ring buffer of recent log entries
//!
//! The `RingBuffer` holds the last N items appended. Once full, every push
//! overwrites the oldest slot. It is owned by the engine loop and never shared,
//! so it carries no lock.

/// Ring buffer storing the most recent items
#[derive(Debug)]
pub struct RingBuffer<T> {
    /// Slots, grown up to `capacity` and then overwritten in place
    slots: Vec<T>,
    /// Next slot to overwrite once full
    write_pos: usize,
    /// Total items ever pushed
    total_written: u64,
    /// Capacity
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a ring buffer with specified capacity
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            write_pos: 0,
            total_written: 0,
            capacity,
        }
    }

    /// Append an item, evicting the oldest if full
    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.write_pos] = item;
        }
        self.write_pos = (self.write_pos + 1) % self.capacity;
        self.total_written += 1;
    }

    /// Iterate over stored items, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        // Until the first wrap the slots are already oldest first
        let split = if self.slots.len() < self.capacity {
            0
        } else {
            self.write_pos
        };
        let (newer, older) = self.slots.split_at(split);
        older.iter().chain(newer.iter())
    }

    /// Get the last N items (oldest first)
    ///
    /// Returns up to `n` items, or fewer if not enough are available.
    pub fn last_n(&self, n: usize) -> Vec<T> {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip).cloned().collect()
    }

    /// Get the total number of items ever pushed
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Get the current fill level
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[path = "buffer_test.rs"]
mod tests;
