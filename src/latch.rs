//! A small reader/writer latch whose guards are owned (they hold their own
//! `Arc` rather than borrowing from it), so a guard can be stashed inside a
//! [`crate::cursor::Cursor`] and carried across a public API call instead of
//! being dropped at the end of the function that acquired it.
//!
//! This is the same reader-count-plus-writer-flag scheme as a standard
//! reader/writer lock; the only reason it is hand-rolled is that
//! `std::sync::RwLock`'s guards borrow from the lock and cannot be returned
//! to a caller on their own. Blocks are pinned only briefly during descent
//! (lock coupling) and held for the lifetime of one cursor otherwise, so a
//! simple spin-wait is adequate; there is no expectation of long contention.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const WRITER: u64 = 1 << 63;
const READERS_MASK: u64 = WRITER - 1;

/// Reader/writer protected cell with owned guards.
pub(crate) struct Latch<T> {
    state: AtomicU64,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through `ReadGuard`/`WriteGuard`,
// whose construction in `read`/`write` enforces the usual shared-xor-exclusive
// discipline via `state`.
unsafe impl<T: Send> Send for Latch<T> {}
unsafe impl<T: Send> Sync for Latch<T> {}

impl<T> Latch<T> {
    pub(crate) fn new(data: T) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU64::new(0),
            data: UnsafeCell::new(data),
        })
    }

    /// Acquire a shared, owned read guard.
    pub(crate) fn read(self: &Arc<Self>) -> ReadGuard<T> {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current & WRITER != 0 {
                std::hint::spin_loop();
                continue;
            }
            if self
                .state
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return ReadGuard {
                    latch: Arc::clone(self),
                };
            }
        }
    }

    /// Acquire an exclusive, owned write guard.
    pub(crate) fn write(self: &Arc<Self>) -> WriteGuard<T> {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current != 0 {
                std::hint::spin_loop();
                continue;
            }
            if self
                .state
                .compare_exchange_weak(0, WRITER, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return WriteGuard {
                    latch: Arc::clone(self),
                };
            }
        }
    }
}

pub(crate) struct ReadGuard<T> {
    latch: Arc<Latch<T>>,
}

impl<T> Deref for ReadGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a reader slot in `state` guarantees no writer holds `WRITER`.
        unsafe { &*self.latch.data.get() }
    }
}

impl<T> Drop for ReadGuard<T> {
    fn drop(&mut self) {
        self.latch.state.fetch_sub(1, Ordering::Release);
    }
}

pub(crate) struct WriteGuard<T> {
    latch: Arc<Latch<T>>,
}

impl<T> Deref for WriteGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding `WRITER` guarantees exclusive access.
        unsafe { &*self.latch.data.get() }
    }
}

impl<T> DerefMut for WriteGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding `WRITER` guarantees exclusive access.
        unsafe { &mut *self.latch.data.get() }
    }
}

impl<T> Drop for WriteGuard<T> {
    fn drop(&mut self) {
        debug_assert_eq!(self.latch.state.load(Ordering::Relaxed) & READERS_MASK, 0);
        self.latch.state.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_can_share() {
        let latch = Latch::new(5);
        let a = latch.read();
        let b = latch.read();
        assert_eq!(*a, 5);
        assert_eq!(*b, 5);
    }

    #[test]
    fn writer_mutates_and_releases() {
        let latch = Latch::new(5);
        {
            let mut w = latch.write();
            *w += 1;
        }
        let r = latch.read();
        assert_eq!(*r, 6);
    }
}
