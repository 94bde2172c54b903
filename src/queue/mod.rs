//! Bounded FIFO queue with back-pressure.
//!
//! The ring is guarded by three semaphores: `free` counts empty slots,
//! `filled` counts slots holding an unread item, and `lock` (a binary
//! semaphore) serializes index updates. Producers write at `newest + 1`,
//! consumers read at `oldest`. The semaphore pair keeps `oldest` from ever
//! overtaking `newest`, so the ring itself carries no extra bounds checks.
//!
//! Items move in and out by value: a successful put hands ownership to the
//! queue, a get hands it to the caller. A rejected non-blocking put returns
//! the item untouched.

use std::cell::UnsafeCell;
use std::fmt;
use std::time::Duration;

use crate::error::QueueError;
use crate::sync::Semaphore;

struct Ring<T> {
    slots: Box<[Option<T>]>,
    newest: usize,
    oldest: usize,
}

impl<T> Ring<T> {
    fn push(&mut self, item: T) {
        self.newest = (self.newest + 1) % self.slots.len();
        debug_assert!(self.slots[self.newest].is_none());
        self.slots[self.newest] = Some(item);
    }

    fn pop(&mut self) -> T {
        let item = self.slots[self.oldest].take();
        self.oldest = (self.oldest + 1) % self.slots.len();
        match item {
            Some(item) => item,
            None => unreachable!("filled semaphore admitted a read of an empty slot"),
        }
    }
}

/// Fixed-capacity ring buffer shared between producer and consumer threads.
pub struct BoundedQueue<T> {
    filled: Semaphore,
    free: Semaphore,
    lock: Semaphore,
    capacity: usize,
    ring: UnsafeCell<Ring<T>>,
}

// SAFETY: the ring is only touched inside `with_ring`, which holds the binary
// `lock` semaphore, so at most one thread accesses it at a time.
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

/// Releases the binary lock semaphore when dropped.
struct LockRelease<'a>(&'a Semaphore);

impl Drop for LockRelease<'_> {
    fn drop(&mut self) {
        self.0.increment();
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::ZeroCapacity);
        }
        let initial_free =
            isize::try_from(capacity).map_err(|_| QueueError::TooLarge(capacity))?;

        let slots = (0..capacity).map(|_| None).collect();

        Ok(Self {
            filled: Semaphore::new(0),
            free: Semaphore::new(initial_free),
            lock: Semaphore::new(1),
            capacity,
            ring: UnsafeCell::new(Ring {
                slots,
                newest: capacity - 1,
                oldest: 0,
            }),
        })
    }

    /// Add an item if a slot is free, without blocking.
    ///
    /// On a full queue the item is handed back in `Err`.
    pub fn put_nonblocking(&self, item: T) -> Result<(), T> {
        if !self.free.try_decrement() {
            return Err(item);
        }
        self.with_ring(|ring| ring.push(item));
        self.filled.increment();
        Ok(())
    }

    /// Add an item, blocking while the queue is full.
    pub fn put(&self, item: T) {
        self.free.decrement();
        self.with_ring(|ring| ring.push(item));
        self.filled.increment();
    }

    /// Remove the oldest item, blocking while the queue is empty.
    pub fn get(&self) -> T {
        self.filled.decrement();
        let item = self.with_ring(Ring::pop);
        self.free.increment();
        item
    }

    /// Remove the oldest item, waiting at most `timeout` for one to arrive.
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        if !self.filled.decrement_timeout(timeout) {
            return None;
        }
        let item = self.with_ring(Ring::pop);
        self.free.increment();
        Some(item)
    }

    /// Maximum number of items the queue holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots holding an unread item.
    pub fn filled(&self) -> usize {
        usize::try_from(self.filled.value()).unwrap_or(0)
    }

    /// Number of empty slots.
    pub fn free(&self) -> usize {
        usize::try_from(self.free.value()).unwrap_or(0)
    }

    fn with_ring<R>(&self, f: impl FnOnce(&mut Ring<T>) -> R) -> R {
        self.lock.decrement();
        let _release = LockRelease(&self.lock);
        // SAFETY: the binary lock semaphore is held until `_release` drops.
        let ring = unsafe { &mut *self.ring.get() };
        f(ring)
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("filled", &self.filled.value())
            .field("free", &self.free.value())
            .finish()
    }
}
