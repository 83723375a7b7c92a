//! The inode layer: one on-disk record per file, with an in-memory
//! open-inode registry tracking open count, a pending-remove flag, and a
//! write-deny count. The partial-sector bounce-buffer read/write
//! algorithm is carried from `filesys/inode.c`.

use std::sync::{Arc, Mutex};

use dataview::PodMethods as _;
use fs_types::{bytes_to_sectors, DiskInode, SECTOR_SIZE};

use crate::disk::Disk;
use crate::error::FsError;
use crate::fs::free_map::FreeMap;

struct State {
    data: DiskInode,
    open_cnt: u32,
    removed: bool,
    deny_write_cnt: u32,
}

/// An open file's (or directory's) inode.
pub struct Inode {
    sector: u32,
    disk: Arc<dyn Disk>,
    state: Mutex<State>,
}

impl Inode {
    #[must_use]
    pub fn sector(&self) -> u32 {
        self.sector
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.state.lock().unwrap().data.length.unsigned_abs()
    }

    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.state.lock().unwrap().removed
    }

    /// Marks the inode for deletion once the last opener closes it.
    pub fn remove(&self) {
        self.state.lock().unwrap().removed = true;
    }

    /// Bumps the write-deny count. Bounded by `open_cnt`, matching the
    /// reference assertion in `inode_deny_write`.
    pub fn deny_write(&self) {
        let mut state = self.state.lock().unwrap();
        state.deny_write_cnt += 1;
        assert!(state.deny_write_cnt <= state.open_cnt);
    }

    pub fn allow_write(&self) {
        let mut state = self.state.lock().unwrap();
        assert!(state.deny_write_cnt > 0);
        assert!(state.deny_write_cnt <= state.open_cnt);
        state.deny_write_cnt -= 1;
    }

    /// Reads up to `buf.len()` bytes starting at `offset`, using a
    /// bounce buffer for any sector not fully covered by the request.
    ///
    /// # Errors
    /// Propagates a disk read error.
    pub fn read_at(&self, buf: &mut [u8], offset: u32) -> Result<usize, FsError> {
        let length = self.length();
        if offset >= length {
            return Ok(0);
        }
        let size = buf.len().min((length - offset) as usize);
        let start = self.state.lock().unwrap().data.start;
        let mut read = 0usize;
        while read < size {
            let sector_idx = (offset as usize + read) / SECTOR_SIZE;
            let sector_ofs = (offset as usize + read) % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_ofs).min(size - read);

            let mut sector = [0u8; SECTOR_SIZE];
            self.disk.read(u64::from(start) + sector_idx as u64, &mut sector)?;
            buf[read..read + chunk].copy_from_slice(&sector[sector_ofs..sector_ofs + chunk]);
            read += chunk;
        }
        Ok(read)
    }

    /// Writes `buf` at `offset`, read-modify-writing any sector not
    /// fully covered. Returns `0` immediately if writes are currently
    /// denied (`inode_deny_write`'s gate).
    ///
    /// # Errors
    /// Propagates a disk I/O error.
    pub fn write_at(&self, buf: &[u8], offset: u32) -> Result<usize, FsError> {
        if self.state.lock().unwrap().deny_write_cnt > 0 {
            return Ok(0);
        }
        let start = self.state.lock().unwrap().data.start;
        let mut written = 0usize;
        while written < buf.len() {
            let sector_idx = (offset as usize + written) / SECTOR_SIZE;
            let sector_ofs = (offset as usize + written) % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - sector_ofs).min(buf.len() - written);

            let mut sector = [0u8; SECTOR_SIZE];
            if sector_ofs != 0 || chunk != SECTOR_SIZE {
                self.disk.read(u64::from(start) + sector_idx as u64, &mut sector)?;
            }
            sector[sector_ofs..sector_ofs + chunk].copy_from_slice(&buf[written..written + chunk]);
            self.disk.write(u64::from(start) + sector_idx as u64, &sector)?;
            written += chunk;
        }
        Ok(written)
    }
}

/// The in-memory open-inode registry (`open_inodes` in the reference
/// implementation): reopening the same sector shares one `Inode`, so
/// `open_cnt`/`deny_write_cnt` stay consistent across every opener.
pub struct InodeTable {
    disk: Arc<dyn Disk>,
    free_map: Arc<FreeMap>,
    open: Mutex<Vec<Arc<Inode>>>,
}

impl InodeTable {
    #[must_use]
    pub fn new(disk: Arc<dyn Disk>, free_map: Arc<FreeMap>) -> Self {
        Self {
            disk,
            free_map,
            open: Mutex::new(Vec::new()),
        }
    }

    /// Writes a fresh on-disk inode at `sector` sized for `length` bytes,
    /// allocating and zero-filling its data sectors.
    ///
    /// # Errors
    /// Propagates free-map exhaustion or a disk I/O error.
    pub fn create(&self, sector: u32, length: u32) -> Result<(), FsError> {
        let sectors = bytes_to_sectors(length as usize);
        let start = if sectors == 0 {
            0
        } else {
            self.free_map.allocate(sectors)?
        };
        let disk_inode = DiskInode::new(start, i32::try_from(length).unwrap_or(i32::MAX));
        let mut sector_buf = [0u8; SECTOR_SIZE];
        *sector_buf.as_data_view_mut().get_mut(0) = disk_inode;
        self.disk.write(u64::from(sector), &sector_buf)?;
        let zero = [0u8; SECTOR_SIZE];
        for i in 0..sectors {
            self.disk.write(u64::from(start) + i as u64, &zero)?;
        }
        Ok(())
    }

    /// Opens (or reopens) the inode at `sector`.
    ///
    /// # Errors
    /// Returns [`FsError::CorruptInode`] if the on-disk magic check
    /// fails, or propagates a disk read error.
    pub fn open(&self, sector: u32) -> Result<Arc<Inode>, FsError> {
        let mut open = self.open.lock().unwrap();
        if let Some(existing) = open.iter().find(|i| i.sector == sector) {
            existing.state.lock().unwrap().open_cnt += 1;
            return Ok(Arc::clone(existing));
        }
        let mut sector_buf = [0u8; SECTOR_SIZE];
        self.disk.read(u64::from(sector), &mut sector_buf)?;
        let data: DiskInode = *sector_buf.as_data_view().get(0);
        if !data.is_valid() {
            return Err(FsError::CorruptInode(sector));
        }
        let inode = Arc::new(Inode {
            sector,
            disk: Arc::clone(&self.disk),
            state: Mutex::new(State {
                data,
                open_cnt: 1,
                removed: false,
                deny_write_cnt: 0,
            }),
        });
        open.push(Arc::clone(&inode));
        Ok(inode)
    }

    /// Closes `inode`; once its open count reaches zero it is dropped
    /// from the registry, and if it had been removed, its inode sector
    /// and data sectors are released back to the free map.
    pub fn close(&self, inode: &Arc<Inode>) {
        let should_drop = {
            let mut state = inode.state.lock().unwrap();
            state.open_cnt -= 1;
            state.open_cnt == 0
        };
        if !should_drop {
            return;
        }
        self.open.lock().unwrap().retain(|i| !Arc::ptr_eq(i, inode));
        let state = inode.state.lock().unwrap();
        if state.removed {
            let sectors = bytes_to_sectors(state.data.length.unsigned_abs() as usize);
            if sectors > 0 {
                self.free_map.release(state.data.start, sectors);
            }
            self.free_map.release(inode.sector, 1);
        }
    }
}
