//! Page-aligned address newtypes, in the style of the reference kernel's
//! `memory::addr` module: thin wrappers that make "did I forget to
//! page-round this" a type error instead of a runtime bug.

use std::fmt;

use crate::param::PAGE_SIZE;

/// A user (or kernel-simulated) virtual address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(usize);

impl VirtAddr {
    #[must_use]
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE == 0
    }

    #[must_use]
    pub const fn round_down(self) -> Self {
        Self(self.0 - (self.0 % PAGE_SIZE))
    }

    #[must_use]
    pub const fn round_up(self) -> Self {
        Self::new(self.0).round_down_with_offset(PAGE_SIZE - 1)
    }

    const fn round_down_with_offset(self, offset: usize) -> Self {
        Self(((self.0 + offset) / PAGE_SIZE) * PAGE_SIZE)
    }

    #[must_use]
    pub const fn offset_in_page(self) -> usize {
        self.0 % PAGE_SIZE
    }

    #[must_use]
    pub const fn byte_add(self, n: usize) -> Self {
        Self(self.0 + n)
    }

    #[must_use]
    pub const fn distance(self, other: Self) -> usize {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Number of pages needed to cover `len` bytes.
#[must_use]
pub const fn pages_for_len(len: usize) -> usize {
    len.div_ceil(PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_down_is_idempotent_on_aligned() {
        let a = VirtAddr::new(PAGE_SIZE * 3);
        assert!(a.is_page_aligned());
        assert_eq!(a.round_down(), a);
    }

    #[test]
    fn round_down_clears_low_bits() {
        let a = VirtAddr::new(PAGE_SIZE * 3 + 100);
        assert_eq!(a.round_down(), VirtAddr::new(PAGE_SIZE * 3));
    }

    #[test]
    fn round_up_pages_partial_tail() {
        assert_eq!(pages_for_len(1), 1);
        assert_eq!(pages_for_len(PAGE_SIZE), 1);
        assert_eq!(pages_for_len(PAGE_SIZE + 1), 2);
    }
}
