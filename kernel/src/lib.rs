//! A teaching kernel's virtual-memory subsystem, std-hosted for
//! testability: the Supplemental Page Table, lazy loading and
//! transmutation, frame-table eviction, anonymous-page swap, file-backed
//! `mmap`/`munmap`, fork-time address-space copy, the page-fault
//! handler, the priority-donation synchronization primitives it sits on,
//! and the flat filesystem those primitives and that handler serve.

pub mod disk;
pub mod error;
pub mod fs;
pub mod memory;
pub mod mmu;
pub mod param;
pub mod process;
pub mod sync;
pub mod syscall;

pub use error::{DiskError, FaultOutcome, FsError, VmError};
pub use process::Process;
