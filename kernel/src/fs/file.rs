//! An open file handle: a cursor position and a deny-write bit layered
//! over a shared `Inode`. A mapped file's `MappedFile` implementation
//! lives here so the `memory` module never depends on the filesystem
//! directly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{FsError, VmError};
use crate::fs::inode::{Inode, InodeTable};
use crate::memory::page::MappedFile;

/// An open file. Each `open()` call yields an independent cursor, even
/// when it shares the underlying `Inode` with other openers.
pub struct File {
    inode: Arc<Inode>,
    table: Arc<InodeTable>,
    pos: AtomicU32,
    deny_write: Mutex<bool>,
}

impl File {
    #[must_use]
    pub fn new(inode: Arc<Inode>, table: Arc<InodeTable>) -> Self {
        Self {
            inode,
            table,
            pos: AtomicU32::new(0),
            deny_write: Mutex::new(false),
        }
    }

    #[must_use]
    pub fn length(&self) -> u32 {
        self.inode.length()
    }

    #[must_use]
    pub fn tell(&self) -> u32 {
        self.pos.load(Ordering::Relaxed)
    }

    pub fn seek(&self, pos: u32) {
        self.pos.store(pos, Ordering::Relaxed);
    }

    /// Reads from the current cursor, advancing it by the amount read.
    ///
    /// # Errors
    /// Propagates a disk I/O error.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, FsError> {
        let pos = self.pos.load(Ordering::Relaxed);
        let n = self.inode.read_at(buf, pos)?;
        self.pos.fetch_add(n as u32, Ordering::Relaxed);
        Ok(n)
    }

    /// Writes at the current cursor, advancing it by the amount written.
    ///
    /// # Errors
    /// Propagates a disk I/O error. Returns `Ok(0)` if a `deny_write`
    /// on this file (an executable currently running) is in effect.
    pub fn write(&self, buf: &[u8]) -> Result<usize, FsError> {
        let pos = self.pos.load(Ordering::Relaxed);
        let n = self.inode.write_at(buf, pos)?;
        self.pos.fetch_add(n as u32, Ordering::Relaxed);
        Ok(n)
    }

    /// Denies writes to the underlying inode for the lifetime of this
    /// guard-less call (paired with `allow_write`); used while an
    /// executable image is running.
    pub fn deny_write(&self) {
        let mut denied = self.deny_write.lock().unwrap();
        if !*denied {
            self.inode.deny_write();
            *denied = true;
        }
    }

    pub fn allow_write(&self) {
        let mut denied = self.deny_write.lock().unwrap();
        if *denied {
            self.inode.allow_write();
            *denied = false;
        }
    }

    #[must_use]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    /// Returns an independent `File` over the same underlying inode, with
    /// its own cursor and deny-write state — what `fork` uses to
    /// duplicate a parent's open file descriptors into the child.
    #[must_use]
    pub fn dup(&self) -> Self {
        let inode = self.table.open(self.inode.sector()).expect("inode already open");
        Self::new(inode, Arc::clone(&self.table))
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.allow_write();
        self.table.close(&self.inode);
    }
}

impl MappedFile for File {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VmError> {
        let offset = u32::try_from(offset).map_err(|_| VmError::Unaligned(offset as usize))?;
        Ok(self.inode.read_at(buf, offset)?)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), VmError> {
        let offset = u32::try_from(offset).map_err(|_| VmError::Unaligned(offset as usize))?;
        self.inode.write_at(buf, offset)?;
        Ok(())
    }

    fn reopen(&self) -> Arc<dyn MappedFile> {
        Arc::new(self.dup())
    }
}
