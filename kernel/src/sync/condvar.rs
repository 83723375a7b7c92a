//! A Mesa-style condition variable: `wait` atomically releases the lock
//! and blocks, then reacquires it on wake; `signal` wakes the
//! highest-priority waiter, `broadcast` wakes all of them.

use std::sync::{Arc, Mutex};

use super::lock::Lock;
use super::scheduler::{current_thread, Tcb};
use super::semaphore::Semaphore;

struct CondWaiter {
    tcb: Arc<Tcb>,
    sema: Arc<Semaphore>,
}

/// A condition variable used together with a [`Lock`].
#[derive(Default)]
pub struct CondVar {
    waiters: Mutex<Vec<CondWaiter>>,
}

impl CondVar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases `lock`, blocks until signalled, then reacquires `lock`.
    /// Each waiter parks on its own private semaphore, so `signal` can
    /// wake exactly one without a spurious-wakeup recheck loop.
    pub fn wait(&self, lock: &Arc<Lock>) {
        let sema = Arc::new(Semaphore::new(0));
        self.waiters.lock().unwrap().push(CondWaiter {
            tcb: current_thread(),
            sema: Arc::clone(&sema),
        });
        lock.release();
        sema.down();
        lock.acquire();
    }

    /// Wakes the highest-priority waiter, if any.
    pub fn signal(&self) {
        let mut waiters = self.waiters.lock().unwrap();
        if waiters.is_empty() {
            return;
        }
        waiters.sort_by(|a, b| b.tcb.effective_priority().cmp(&a.tcb.effective_priority()));
        let w = waiters.remove(0);
        drop(waiters);
        w.sema.up();
    }

    /// Wakes every current waiter, highest priority first.
    pub fn broadcast(&self) {
        while !self.waiters.lock().unwrap().is_empty() {
            self.signal();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::sync::scheduler;

    #[test]
    fn signal_wakes_one_waiter() {
        let lock = Lock::new();
        let cond = Arc::new(CondVar::new());
        let woke = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for name in ["a", "b"] {
            let lock = Arc::clone(&lock);
            let cond = Arc::clone(&cond);
            let woke = Arc::clone(&woke);
            handles.push(scheduler::spawn(name, 10, move || {
                lock.acquire();
                cond.wait(&lock);
                woke.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                lock.release();
            }));
        }

        std::thread::sleep(Duration::from_millis(30));
        lock.acquire();
        cond.signal();
        lock.release();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(woke.load(std::sync::atomic::Ordering::SeqCst), 1);

        lock.acquire();
        cond.broadcast();
        lock.release();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(woke.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
