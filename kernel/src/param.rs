//! Compile-time configuration constants, in the style of the reference
//! kernel's flat `param.rs`, plus a small runtime-overridable subset for
//! tests that want to force eviction/swap exhaustion deterministically.

/// Bytes per virtual-memory page.
pub const PAGE_SIZE: usize = 4096;

/// Number of frames in the default user page pool.
pub const NFRAMES: usize = 64;

/// Number of 8-sector swap slots in the default swap disk.
pub const NSWAP_SLOTS: usize = 64;

/// Sectors per anonymous-page swap slot.
pub const SECTORS_PER_SLOT: usize = fs_types::SECTORS_PER_SWAP_SLOT;

/// Open file descriptors per process, descriptors 0/1 reserved for console.
pub const NOFILE: usize = 16;

/// Size of the stack-growth window below `USER_STACK_TOP`.
pub const STACK_GROWTH_WINDOW: usize = 1024 * 1024;

/// Maximum distance (bytes) a faulting address may lie below the user RSP
/// and still be treated as a stack-growth fault (accommodates `push`'s
/// pre-decrement).
pub const STACK_FAULT_SLACK: usize = 8;

/// Fixed top of the user stack region.
pub const USER_STACK_TOP: usize = 0x4747_0000;

/// Maximum depth walked by priority donation chains.
pub const MAX_DONATION_DEPTH: usize = 8;

/// Runtime-overridable knobs, for tests that want a tiny frame pool or swap
/// area so that eviction/exhaustion paths are exercised deterministically
/// instead of requiring gigabytes of simulated memory.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub nframes: usize,
    pub nswap_slots: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            nframes: NFRAMES,
            nswap_slots: NSWAP_SLOTS,
        }
    }
}

impl KernelConfig {
    #[must_use]
    pub const fn new(nframes: usize, nswap_slots: usize) -> Self {
        Self {
            nframes,
            nswap_slots,
        }
    }
}
