//! Indexable binary heap.

use crate::error::{contract, Error, Result};
use crate::traits::Store;

type Less<T> = Box<dyn Fn(&T, &T) -> bool + Send>;
type OnMove<T> = Box<dyn FnMut(&mut T, Option<usize>) + Send>;

/// An array-backed binary heap ordered by a user comparator.
///
/// The root is the item `x` for which `less(x, y)` holds against every other
/// `y`: pass `|a, b| a < b` for a min-heap. A heap may have a fixed
/// capacity; pushing beyond it is a bug and panics.
///
/// An optional move callback is invoked with an item's new slot every time
/// it moves, and with `None` when it leaves the heap. Items that record
/// their own slot can later be removed with [`remove`](Heap::remove) or
/// re-prioritised with [`get_mut`](Heap::get_mut) followed by
/// [`fix`](Heap::fix).
///
/// ```rust
/// use batonflow::buffer::Heap;
///
/// let mut heap = Heap::new(|a: &u32, b: &u32| a < b);
/// for x in [5, 1, 4] {
///     heap.push(x);
/// }
/// assert_eq!(heap.pop(), Some(1));
/// assert_eq!(heap.peek(), Some(&4));
/// ```
pub struct Heap<T> {
    items: Vec<T>,
    less: Less<T>,
    capacity: Option<usize>,
    on_move: Option<OnMove<T>>,
}

impl<T> Heap<T> {
    /// Create an unbounded heap
    pub fn new<F>(less: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + 'static,
    {
        Self {
            items: Vec::new(),
            less: Box::new(less),
            capacity: None,
            on_move: None,
        }
    }

    /// Create a heap holding at most `capacity` items
    pub fn bounded<F>(capacity: usize, less: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + 'static,
    {
        let mut heap = Self::new(less);
        heap.items.reserve_exact(capacity);
        heap.capacity = Some(capacity);
        heap
    }

    /// Register a callback run whenever an item changes slot.
    pub fn on_move<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut T, Option<usize>) + Send + 'static,
    {
        self.on_move = Some(Box::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Fixed capacity, if any
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.capacity.is_some_and(|cap| self.items.len() >= cap)
    }

    /// The root item
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// The item in slot `i`
    pub fn get(&self, i: usize) -> Option<&T> {
        self.items.get(i)
    }

    /// Mutable access to slot `i`.
    ///
    /// If the change affects ordering, call [`fix`](Heap::fix) with the same
    /// slot afterwards.
    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        self.items.get_mut(i)
    }

    /// Add an item.
    ///
    /// # Panics
    ///
    /// Panics if the heap is at its fixed capacity.
    pub fn push(&mut self, item: T) {
        contract(self.room());
        self.push_unchecked(item);
    }

    /// Add an item, handing it back if the heap is full.
    pub fn try_push(&mut self, item: T) -> std::result::Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.push_unchecked(item);
        Ok(())
    }

    /// Remove and return the root.
    pub fn pop(&mut self) -> Option<T> {
        self.remove(0)
    }

    /// Remove and return the item in slot `i`.
    pub fn remove(&mut self, i: usize) -> Option<T> {
        if i >= self.items.len() {
            return None;
        }
        let last = self.items.len() - 1;
        if i != last {
            self.swap(i, last);
        }
        let mut item = self.items.pop()?;
        if i < self.items.len() {
            self.fix(i);
        }
        if let Some(on_move) = self.on_move.as_mut() {
            on_move(&mut item, None);
        }
        Some(item)
    }

    /// Restore ordering after the item in slot `i` changed.
    pub fn fix(&mut self, i: usize) {
        if i < self.items.len() && !self.sift_down(i) {
            self.sift_up(i);
        }
    }

    fn room(&self) -> Result<()> {
        match self.capacity {
            Some(capacity) if self.items.len() >= capacity => Err(Error::HeapFull { capacity }),
            _ => Ok(()),
        }
    }

    fn push_unchecked(&mut self, item: T) {
        self.items.push(item);
        let i = self.items.len() - 1;
        self.moved(i);
        self.sift_up(i);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !(self.less)(&self.items[i], &self.items[parent]) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    /// Returns whether the item moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let n = self.items.len();
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < n && (self.less)(&self.items[right], &self.items[left]) {
                child = right;
            }
            if !(self.less)(&self.items[child], &self.items[i]) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.items.swap(i, j);
        self.moved(i);
        self.moved(j);
    }

    fn moved(&mut self, i: usize) {
        if let Some(on_move) = self.on_move.as_mut() {
            on_move(&mut self.items[i], Some(i));
        }
    }
}

impl<T> std::fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("len", &self.items.len())
            .field("capacity", &self.capacity)
            .field("tracked", &self.on_move.is_some())
            .finish()
    }
}

impl<T: Send + 'static> Store<T> for Heap<T> {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_full(&self) -> bool {
        Heap::is_full(self)
    }

    fn peek(&self) -> Option<&T> {
        Heap::peek(self)
    }

    fn read(&mut self) -> Option<T> {
        self.pop()
    }

    fn write(&mut self, item: T) {
        self.push(item)
    }
}
