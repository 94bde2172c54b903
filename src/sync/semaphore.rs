//! Counting semaphore built on a mutex and a condition variable.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A counting semaphore.
///
/// The counter may start negative, in which case that many increments are
/// needed before any decrement can succeed. Every increment wakes all
/// waiters and each of them re-checks the counter, so a wakeup is never lost
/// when several threads block on the same semaphore.
#[derive(Debug)]
pub struct Semaphore {
    value: Mutex<isize>,
    condition: Condvar,
}

impl Semaphore {
    /// Create a semaphore with the given initial value.
    pub fn new(initial: isize) -> Self {
        Self {
            value: Mutex::new(initial),
            condition: Condvar::new(),
        }
    }

    /// Decrement if the value is positive, without blocking.
    ///
    /// Returns `true` if the value was decremented.
    pub fn try_decrement(&self) -> bool {
        let mut value = self.lock();
        if *value <= 0 {
            return false;
        }
        *value -= 1;
        true
    }

    /// Block until the value is positive, then decrement it.
    pub fn decrement(&self) {
        let mut value = self.lock();
        while *value <= 0 {
            value = self
                .condition
                .wait(value)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *value -= 1;
    }

    /// Like [`decrement`](Self::decrement), but gives up after `timeout`.
    ///
    /// Returns `true` if the value was decremented. A timeout too large to
    /// express as a deadline waits indefinitely.
    pub fn decrement_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.decrement();
            return true;
        };
        let mut value = self.lock();
        while *value <= 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            value = self
                .condition
                .wait_timeout(value, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *value -= 1;
        true
    }

    /// Increment the value and wake every waiter.
    pub fn increment(&self) {
        let mut value = self.lock();
        *value += 1;
        self.condition.notify_all();
    }

    /// Current value. Only a snapshot; it may change as soon as this returns.
    pub fn value(&self) -> isize {
        *self.lock()
    }

    // The guarded value is a plain integer, so a panic in another holder
    // cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, isize> {
        self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
