//! A priority-scheduled thread registry. Real hardware scheduling is out
//! of scope; what `Semaphore`/`Lock`/`CondVar` need from "the scheduler"
//! is a notion of the current thread's identity and priority that they
//! can read and mutate. Each simulated kernel thread runs on its
//! own OS thread via [`spawn`], which registers a [`Tcb`] in thread-local
//! storage before handing control to the caller's closure.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::sync::lock::Lock;

/// Maximum depth walked by a priority-donation chain.
pub const MAX_DONATION_DEPTH: usize = crate::param::MAX_DONATION_DEPTH;

thread_local! {
    static CURRENT: RefCell<Option<Arc<Tcb>>> = const { RefCell::new(None) };
}

/// Thread control block: identity, base/effective priority, and the
/// donation bookkeeping `Lock` needs.
pub struct Tcb {
    pub name: &'static str,
    base_priority: AtomicU32,
    effective_priority: AtomicU32,
    pub(crate) wait_on_lock: Mutex<Option<Arc<Lock>>>,
    donations: Mutex<Vec<Arc<Tcb>>>,
}

impl Tcb {
    fn new(name: &'static str, priority: u32) -> Arc<Self> {
        Arc::new(Self {
            name,
            base_priority: AtomicU32::new(priority),
            effective_priority: AtomicU32::new(priority),
            wait_on_lock: Mutex::new(None),
            donations: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn effective_priority(&self) -> u32 {
        self.effective_priority.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn base_priority(&self) -> u32 {
        self.base_priority.load(Ordering::SeqCst)
    }

    pub(crate) fn set_effective_priority(&self, priority: u32) {
        self.effective_priority.store(priority, Ordering::SeqCst);
    }

    pub(crate) fn add_donation(&self, from: Arc<Tcb>) {
        self.donations.lock().unwrap().push(from);
    }

    /// Drops donation entries from threads that were waiting on `lock`,
    /// mirroring `remove_with_lock` in the reference synchronization code.
    pub(crate) fn remove_donations_for_lock(&self, lock: &Arc<Lock>) {
        self.donations.lock().unwrap().retain(|t| {
            let wait_on_lock = t.wait_on_lock.lock().unwrap();
            !matches!(&*wait_on_lock, Some(l) if Arc::ptr_eq(l, lock))
        });
    }

    /// Recomputes effective priority as `max(base, surviving donations)`.
    pub(crate) fn refresh_priority(&self) {
        let donated_max = self
            .donations
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.effective_priority())
            .max();
        let new_priority = donated_max.map_or_else(|| self.base_priority(), |d| d.max(self.base_priority()));
        self.set_effective_priority(new_priority);
    }
}

/// Returns the calling OS thread's registered `Tcb`.
///
/// # Panics
/// Panics if called from a thread not started via [`spawn`] — there is no
/// notion of "current thread" outside the simulated scheduler.
#[must_use]
pub fn current_thread() -> Arc<Tcb> {
    CURRENT.with(|c| {
        c.borrow()
            .clone()
            .expect("current_thread() called outside a thread started by sync::spawn")
    })
}

/// Starts `f` on a new OS thread registered with the simulated scheduler
/// under `name` at `priority`. Until `f` calls [`current_thread`] itself
/// (directly or via a `Lock`/`Semaphore`/`CondVar`), the thread has no
/// registered identity.
pub fn spawn<F>(name: &'static str, priority: u32, f: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            CURRENT.with(|c| *c.borrow_mut() = Some(Tcb::new(name, priority)));
            f();
        })
        .expect("failed to spawn kernel thread")
}

/// Sets the calling thread's base priority and recomputes its effective
/// priority against any surviving donations.
pub fn set_priority(priority: u32) {
    let tcb = current_thread();
    tcb.base_priority.store(priority, Ordering::SeqCst);
    tcb.refresh_priority();
}

/// The calling thread's current effective priority.
#[must_use]
pub fn priority() -> u32 {
    current_thread().effective_priority()
}

pub(crate) fn donate_priority(start: &Arc<Tcb>) {
    let mut curr = Arc::clone(start);
    for _ in 0..MAX_DONATION_DEPTH {
        let lock = curr.wait_on_lock.lock().unwrap().clone();
        let Some(lock) = lock else { return };
        let Some(holder) = lock.holder() else { return };
        if holder.effective_priority() >= curr.effective_priority() {
            return;
        }
        holder.set_effective_priority(curr.effective_priority());
        curr = holder;
    }
}
