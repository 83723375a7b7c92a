//! A binary semaphore with an owner and priority donation, grounded on
//! the reference `lock_acquire`/`lock_release` algorithm.

use std::sync::{Arc, Mutex};

use tracing::trace;

use super::scheduler::{current_thread, donate_priority, Tcb};
use super::semaphore::Semaphore;

struct Inner {
    holder: Option<Arc<Tcb>>,
}

/// A mutual-exclusion lock whose contended `acquire` donates the waiter's
/// priority up the holder chain.
pub struct Lock {
    sema: Semaphore,
    inner: Mutex<Inner>,
}

impl Lock {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sema: Semaphore::new(1),
            inner: Mutex::new(Inner { holder: None }),
        })
    }

    /// Blocks until the lock is free, donating priority to the holder
    /// chain (up to [`crate::param::MAX_DONATION_DEPTH`] levels) while
    /// contended.
    pub fn acquire(self: &Arc<Self>) {
        let curr = current_thread();
        let holder = self.inner.lock().unwrap().holder.clone();
        if let Some(holder) = holder {
            *curr.wait_on_lock.lock().unwrap() = Some(Arc::clone(self));
            holder.add_donation(Arc::clone(&curr));
            trace!(thread = curr.name, "lock: donating and blocking");
            donate_priority(&curr);
        }
        self.sema.down();
        *curr.wait_on_lock.lock().unwrap() = None;
        self.inner.lock().unwrap().holder = Some(curr);
    }

    /// Non-blocking `acquire`. Returns whether the lock was taken.
    pub fn try_acquire(self: &Arc<Self>) -> bool {
        if self.sema.try_down() {
            self.inner.lock().unwrap().holder = Some(current_thread());
            true
        } else {
            false
        }
    }

    /// Releases the lock: drops donations that were waiting specifically
    /// on this lock, recomputes the releasing thread's own priority, then
    /// wakes the highest-priority waiter.
    pub fn release(self: &Arc<Self>) {
        let curr = current_thread();
        curr.remove_donations_for_lock(self);
        curr.refresh_priority();
        self.inner.lock().unwrap().holder = None;
        self.sema.up();
    }

    #[must_use]
    pub fn is_held_by_current(self: &Arc<Self>) -> bool {
        self.inner
            .lock()
            .unwrap()
            .holder
            .as_ref()
            .is_some_and(|h| Arc::ptr_eq(h, &current_thread()))
    }

    pub(crate) fn holder(&self) -> Option<Arc<Tcb>> {
        self.inner.lock().unwrap().holder.clone()
    }
}
