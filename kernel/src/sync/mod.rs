//! Synchronization primitives consumed by the VM core: a priority-ordered
//! semaphore, a lock with priority donation, a Mesa-style condition
//! variable, and the simulated priority scheduler they're built on.

mod condvar;
mod lock;
mod scheduler;
mod semaphore;

pub use condvar::CondVar;
pub use lock::Lock;
pub use scheduler::{current_thread, priority, set_priority, spawn, Tcb};
pub use semaphore::Semaphore;
