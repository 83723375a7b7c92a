//! Anonymous-page swap backing: a bitmap of fixed-size slots over a
//! dedicated swap disk, each slot eight sectors.

use std::sync::{Arc, Mutex};

use crate::disk::{Disk, SECTOR_SIZE};
use crate::error::VmError;
use crate::param::{PAGE_SIZE, SECTORS_PER_SLOT};

const _: () = assert!(SECTOR_SIZE * SECTORS_PER_SLOT == PAGE_SIZE);

struct Inner {
    occupied: Vec<bool>,
}

/// The process-wide anon-swap table: a bitmap over `disk`, one bit per
/// slot, guarded by a single lock.
pub struct SwapTable {
    disk: Arc<dyn Disk>,
    bitmap_lock: Mutex<Inner>,
}

impl SwapTable {
    #[must_use]
    pub fn new(disk: Arc<dyn Disk>, nslots: usize) -> Self {
        assert!(
            disk.len_sectors() >= (nslots * SECTORS_PER_SLOT) as u64,
            "swap disk too small for {nslots} slots"
        );
        Self {
            disk,
            bitmap_lock: Mutex::new(Inner {
                occupied: vec![false; nslots],
            }),
        }
    }

    /// Writes `bytes` to a freshly claimed slot.
    ///
    /// # Errors
    /// Returns [`VmError::SwapExhausted`] if every slot is occupied.
    pub fn swap_out(&self, bytes: &[u8; PAGE_SIZE]) -> Result<usize, VmError> {
        let slot = {
            let mut inner = self.bitmap_lock.lock().unwrap();
            let slot = inner
                .occupied
                .iter()
                .position(|&b| !b)
                .ok_or(VmError::SwapExhausted)?;
            inner.occupied[slot] = true;
            slot
        };
        self.write_slot(slot, bytes)?;
        Ok(slot)
    }

    /// Reads a slot's contents into `bytes` and frees the slot.
    ///
    /// # Errors
    /// Returns [`VmError::InvalidSwapSlot`] if `slot` is out of range.
    pub fn swap_in(&self, slot: usize, bytes: &mut [u8; PAGE_SIZE]) -> Result<(), VmError> {
        self.read_slot(slot, bytes)?;
        self.free(slot);
        Ok(())
    }

    /// Reads a slot's contents without freeing it, for fork-time copying
    /// of a non-resident ANON page: the source page must remain swapped
    /// out after the copy.
    ///
    /// # Errors
    /// Returns [`VmError::InvalidSwapSlot`] if `slot` is out of range.
    pub fn peek(&self, slot: usize, bytes: &mut [u8; PAGE_SIZE]) -> Result<(), VmError> {
        self.read_slot(slot, bytes)
    }

    /// Marks `slot` free without reading it back, used when destroying an
    /// ANON page that was swapped out and never resumed.
    pub fn free(&self, slot: usize) {
        let mut inner = self.bitmap_lock.lock().unwrap();
        if let Some(bit) = inner.occupied.get_mut(slot) {
            *bit = false;
        }
    }

    fn write_slot(&self, slot: usize, bytes: &[u8; PAGE_SIZE]) -> Result<(), VmError> {
        let base = (slot * SECTORS_PER_SLOT) as u64;
        for i in 0..SECTORS_PER_SLOT {
            let mut sector = [0u8; SECTOR_SIZE];
            sector.copy_from_slice(&bytes[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
            self.disk
                .write(base + i as u64, &sector)
                .map_err(|_| VmError::InvalidSwapSlot(slot))?;
        }
        Ok(())
    }

    fn read_slot(&self, slot: usize, bytes: &mut [u8; PAGE_SIZE]) -> Result<(), VmError> {
        if slot >= self.bitmap_lock.lock().unwrap().occupied.len() {
            return Err(VmError::InvalidSwapSlot(slot));
        }
        let base = (slot * SECTORS_PER_SLOT) as u64;
        for i in 0..SECTORS_PER_SLOT {
            let mut sector = [0u8; SECTOR_SIZE];
            self.disk
                .read(base + i as u64, &mut sector)
                .map_err(|_| VmError::InvalidSwapSlot(slot))?;
            bytes[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE].copy_from_slice(&sector);
        }
        Ok(())
    }
}
