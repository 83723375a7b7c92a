//! Error taxonomy: fatal invariants panic directly at the point of
//! detection (never through these types), process-fatal conditions
//! surface through [`FaultOutcome::Kill`], and operation-local failures
//! are typed `Result`s the caller must handle.

/// Errors raised by the simulated disk device.
#[derive(Debug, thiserror::Error)]
pub enum DiskError {
    #[error("sector {sector} out of range (disk has {len} sectors)")]
    OutOfRange { sector: u64, len: u64 },
}

/// Errors raised by the filesystem layer (free map, inode, directory,
/// file). These are operation-local: callers (ultimately the syscall
/// surface) turn them into -1/false/NULL at the user boundary.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("disk error: {0}")]
    Disk(#[from] DiskError),
    #[error("free map exhausted: no {count} contiguous free sectors")]
    FreeMapExhausted { count: usize },
    #[error("no directory entry named {0:?}")]
    NotFound(alloc_name::Name),
    #[error("a directory entry named {0:?} already exists")]
    AlreadyExists(alloc_name::Name),
    #[error("file name {0:?} is empty or longer than {max} bytes", max = fs_types::NAME_MAX)]
    InvalidName(alloc_name::Name),
    #[error("write denied: file is currently open for execution")]
    WriteDenied,
    #[error("on-disk inode at sector {0} failed its magic check")]
    CorruptInode(u32),
}

/// Wraps an owned name so error values stay `'static` without pulling in
/// borrowed lifetimes at the error-type boundary.
pub mod alloc_name {
    #[derive(Debug, Clone, derive_more::Display)]
    pub struct Name(pub String);

    impl From<&str> for Name {
        fn from(s: &str) -> Self {
            Self(s.to_owned())
        }
    }
}

/// Errors raised by the virtual-memory subsystem. Operation-local: callers
/// are the fault handler and the `mmap`/`munmap` syscall entry points,
/// which translate these into process-fatal exits or a 0/false return.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("virtual address {0:#x} is already mapped in this address space")]
    AlreadyMapped(usize),
    #[error("no resident or swappable frame available")]
    FrameExhausted,
    #[error("swap disk exhausted: no free slot")]
    SwapExhausted,
    #[error("swap slot index {0} is out of range")]
    InvalidSwapSlot(usize),
    #[error("address {0:#x} is not page-aligned")]
    Unaligned(usize),
    #[error("mmap length must be nonzero")]
    ZeroLength,
    #[error("requested mapping overlaps an existing page")]
    Overlap,
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Outcome of resolving a page fault: the chokepoint that turns a failed
/// resolution into a process-fatal exit rather than propagating an error
/// type further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// The fault was resolved; execution may resume.
    Resolved,
    /// The fault is process-fatal; the caller must terminate the faulting
    /// process with exit status -1.
    Kill,
}
