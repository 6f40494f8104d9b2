//! Growable FIFO ring buffer.

use crate::traits::Store;

/// A FIFO queue over a power-of-two circular array.
///
/// Writing into a full buffer doubles its capacity. [`shrink`] halves it
/// again once occupancy has dropped to a quarter, never going below the
/// floor given at construction. Capacity is always at least the floor and
/// at least the number of held items.
///
/// [`shrink`]: RingBuffer::shrink
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
    min_capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Floor used by [`Default`]
    pub const DEFAULT_MIN_CAPACITY: usize = 16;

    /// Create a buffer whose capacity never drops below `min_capacity`
    /// (rounded up to a power of two, at least 1).
    pub fn new(min_capacity: usize) -> Self {
        let min_capacity = min_capacity.max(1).next_power_of_two();
        Self {
            slots: empty_slots(min_capacity),
            head: 0,
            len: 0,
            min_capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn min_capacity(&self) -> usize {
        self.min_capacity
    }

    /// Append an item, growing if needed.
    pub fn write(&mut self, item: T) {
        if self.len == self.capacity() {
            self.resize(self.capacity() * 2);
        }
        let tail = self.slot(self.len);
        self.slots[tail] = Some(item);
        self.len += 1;
    }

    /// Remove the oldest item.
    pub fn read(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = self.slot(1);
        self.len -= 1;
        item
    }

    /// The oldest item, if any
    pub fn peek(&self) -> Option<&T> {
        if self.len == 0 {
            None
        } else {
            self.slots[self.head].as_ref()
        }
    }

    /// Halve the capacity if at most a quarter of it is in use and the result
    /// stays at or above the floor. Returns whether the buffer shrank.
    pub fn shrink(&mut self) -> bool {
        let half = self.capacity() / 2;
        if self.len > self.capacity() / 4 || half < self.min_capacity {
            return false;
        }
        self.resize(half);
        true
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[self.slot(i)].as_ref())
    }

    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) & (self.capacity() - 1)
    }

    fn resize(&mut self, capacity: usize) {
        trace!(from = self.capacity(), to = capacity, len = self.len, "resizing ring buffer");
        let mut slots = empty_slots(capacity);
        for (i, slot) in slots.iter_mut().enumerate().take(self.len) {
            let from = self.slot(i);
            *slot = self.slots[from].take();
        }
        self.slots = slots;
        self.head = 0;
    }
}

fn empty_slots<T>(capacity: usize) -> Vec<Option<T>> {
    std::iter::repeat_with(|| None).take(capacity).collect()
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_CAPACITY)
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("min_capacity", &self.min_capacity)
            .finish()
    }
}

impl<T: Send + 'static> Store<T> for RingBuffer<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn is_full(&self) -> bool {
        false
    }

    fn peek(&self) -> Option<&T> {
        RingBuffer::peek(self)
    }

    fn read(&mut self) -> Option<T> {
        RingBuffer::read(self)
    }

    fn write(&mut self, item: T) {
        RingBuffer::write(self, item)
    }

    fn maintain(&mut self) {
        if self.shrink() {
            debug!(capacity = self.capacity(), len = self.len, "ring buffer shrank");
        }
    }
}
