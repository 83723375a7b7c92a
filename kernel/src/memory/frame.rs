//! The frame table: a pool of physical frames carved from a user page
//! pool, with FIFO victim selection. Hosting this as `std` means
//! "physical memory" is just a heap allocation; what the pool actually
//! tracks is *capacity* and *residency order*, which is all the eviction
//! contract needs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::VmError;
use crate::param::PAGE_SIZE;

/// A single physical frame: one zeroed page of storage.
pub struct Frame {
    bytes: Box<[u8; PAGE_SIZE]>,
}

impl Frame {
    fn zeroed() -> Self {
        Self {
            bytes: Box::new([0u8; PAGE_SIZE]),
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.bytes
    }

    #[must_use]
    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.bytes
    }

    /// A stable identity for this frame's storage, used as the `Mmu`'s
    /// notion of a physical address. Not dereferenced as a raw pointer
    /// outside this module's own accessors.
    #[must_use]
    pub fn kva(&self) -> usize {
        self.bytes.as_ptr() as usize
    }
}

/// Anything that can be evicted: a resident `Page` implements this so the
/// frame pool can ask it to swap itself out without the pool needing to
/// know about page variants.
pub trait Resident: Send + Sync {
    /// Writes this page's frame contents to its backing store (or
    /// discards them, per variant), detaches the frame, and returns it to
    /// the pool. Must be idempotent: calling it on an already
    /// non-resident page is a no-op that returns `Ok(())`.
    fn evict(&self) -> Result<(), VmError>;
}

struct Inner {
    in_use: usize,
    /// Residency order for FIFO victim selection. May contain stale
    /// entries for pages already evicted by some other path (e.g. an
    /// explicit `munmap`); `acquire` skips over those.
    fifo: VecDeque<Arc<dyn Resident>>,
}

/// The process-wide pool of physical frames.
pub struct FramePool {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl FramePool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner {
                in_use: 0,
                fifo: VecDeque::new(),
            }),
        }
    }

    /// Acquires a zeroed frame for `owner`, evicting the head of the FIFO
    /// list if the pool is exhausted.
    ///
    /// # Errors
    /// Returns [`VmError::FrameExhausted`] if eviction cannot free a frame
    /// (the FIFO list is empty but the pool is at capacity).
    pub fn acquire(&self, owner: Arc<dyn Resident>) -> Result<Frame, VmError> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.in_use < self.capacity {
                    inner.in_use += 1;
                    break;
                }
            }
            let victim = self.inner.lock().unwrap().fifo.pop_front();
            match victim {
                Some(v) => {
                    trace!("frame pool: evicting FIFO head");
                    v.evict()?;
                }
                None => return Err(VmError::FrameExhausted),
            }
        }
        self.inner.lock().unwrap().fifo.push_back(owner);
        Ok(Frame::zeroed())
    }

    /// Releases a frame back to the pool, decrementing the in-use count.
    /// Called by a page's own `evict`/`destroy` path once it has detached
    /// its frame.
    pub fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.in_use = inner.in_use.saturating_sub(1);
    }

    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.lock().unwrap().in_use
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct DummyResident {
        evicted: AtomicBool,
    }

    impl Resident for DummyResident {
        fn evict(&self) -> Result<(), VmError> {
            self.evicted.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn exhaustion_triggers_fifo_eviction() {
        let pool = FramePool::new(1);
        let first = Arc::new(DummyResident {
            evicted: AtomicBool::new(false),
        });
        let _frame = pool.acquire(Arc::clone(&first) as Arc<dyn Resident>).unwrap();
        assert_eq!(pool.in_use(), 1);

        // Pool is full: acquiring again must evict `first`.
        // A real caller would have `first.evict()` call `pool.release()`
        // itself; simulate that here.
        let second = Arc::new(DummyResident {
            evicted: AtomicBool::new(false),
        });
        struct Evicting<'a> {
            pool: &'a FramePool,
            inner: Arc<DummyResident>,
        }
        impl Resident for Evicting<'_> {
            fn evict(&self) -> Result<(), VmError> {
                self.inner.evicted.store(true, Ordering::SeqCst);
                self.pool.release();
                Ok(())
            }
        }
        let pool2 = FramePool::new(1);
        let victim = Arc::new(Evicting {
            pool: &pool2,
            inner: Arc::clone(&first),
        });
        let _f1 = pool2.acquire(victim as Arc<dyn Resident>).unwrap();
        let _f2 = pool2.acquire(Arc::clone(&second) as Arc<dyn Resident>).unwrap();
        assert!(first.evicted.load(Ordering::SeqCst));
        assert_eq!(pool2.in_use(), 1);
    }
}
