//! A simulated MMU page table, standing in for the real hardware page
//! table the reference kernel programs directly (`memory::vm::kernel`).
//! The Supplemental Page Table is the authority on what is mapped; this
//! is a derived cache of that state for resident pages, giving the fault
//! handler and eviction path somewhere to install/clear/query a PTE and
//! read back a dirty bit without requiring real page-table hardware to
//! run the test suite.

use std::collections::HashMap;
use std::sync::Mutex;

use bitflags::bitflags;

use crate::memory::addr::VirtAddr;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        const PRESENT  = 0b001;
        const WRITABLE = 0b010;
        const DIRTY    = 0b100;
    }
}

#[derive(Debug, Clone, Copy)]
struct Pte {
    frame_bytes_ptr: usize,
    flags: PteFlags,
}

/// A per-address-space simulated page table. Backing storage for a
/// resident page is a raw pointer to the frame's byte buffer; the frame
/// pool, not the `Mmu`, owns that memory.
#[derive(Default)]
pub struct Mmu {
    ptes: Mutex<HashMap<VirtAddr, Pte>>,
}

impl Mmu {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a mapping `va -> frame`, honouring `writable`. Overwrites
    /// any existing mapping for `va`.
    pub fn map(&self, va: VirtAddr, frame_bytes_ptr: usize, writable: bool) {
        let mut flags = PteFlags::PRESENT;
        if writable {
            flags |= PteFlags::WRITABLE;
        }
        self.ptes.lock().unwrap().insert(
            va,
            Pte {
                frame_bytes_ptr,
                flags,
            },
        );
    }

    /// Removes the mapping for `va`, if any.
    pub fn unmap(&self, va: VirtAddr) {
        self.ptes.lock().unwrap().remove(&va);
    }

    #[must_use]
    pub fn is_present(&self, va: VirtAddr) -> bool {
        self.ptes.lock().unwrap().contains_key(&va)
    }

    #[must_use]
    pub fn is_writable(&self, va: VirtAddr) -> bool {
        self.ptes
            .lock()
            .unwrap()
            .get(&va)
            .is_some_and(|p| p.flags.contains(PteFlags::WRITABLE))
    }

    #[must_use]
    pub fn is_dirty(&self, va: VirtAddr) -> bool {
        self.ptes
            .lock()
            .unwrap()
            .get(&va)
            .is_some_and(|p| p.flags.contains(PteFlags::DIRTY))
    }

    /// Marks `va`'s PTE dirty; simulates what a real CPU does on a
    /// writable store, since there is no hardware here to set the bit for
    /// us. Tests call this to simulate "the process wrote to the page".
    pub fn mark_dirty(&self, va: VirtAddr) {
        if let Some(pte) = self.ptes.lock().unwrap().get_mut(&va) {
            pte.flags |= PteFlags::DIRTY;
        }
    }

    pub fn clear_dirty(&self, va: VirtAddr) {
        if let Some(pte) = self.ptes.lock().unwrap().get_mut(&va) {
            pte.flags.remove(PteFlags::DIRTY);
        }
    }

    #[must_use]
    pub fn frame_ptr(&self, va: VirtAddr) -> Option<usize> {
        self.ptes.lock().unwrap().get(&va).map(|p| p.frame_bytes_ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_then_query() {
        let mmu = Mmu::new();
        let va = VirtAddr::new(0x1000);
        assert!(!mmu.is_present(va));
        mmu.map(va, 0xDEAD, true);
        assert!(mmu.is_present(va));
        assert!(mmu.is_writable(va));
        assert!(!mmu.is_dirty(va));
        mmu.mark_dirty(va);
        assert!(mmu.is_dirty(va));
        mmu.unmap(va);
        assert!(!mmu.is_present(va));
    }
}
