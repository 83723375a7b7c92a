//! The top-level filesystem surface: ties the free map, the inode table,
//! and the root directory together behind one lock, mirroring
//! `filesys_init`/`filesys_create`/`filesys_open`/`filesys_remove`. Every
//! entry point serializes on `filesys_lock`, the one shared resource the
//! whole layer contends on.

use std::sync::Arc;

use tracing::trace;

use crate::disk::Disk;
use crate::error::FsError;
use crate::fs::directory::{format_root, Directory};
use crate::fs::file::File;
use crate::fs::free_map::FreeMap;
use crate::fs::inode::InodeTable;
use crate::sync::Lock;

/// The filesystem, with its own lock serializing every operation —
/// the reference implementation's single global `filesys_lock`.
pub struct Filesys {
    disk: Arc<dyn Disk>,
    free_map: Arc<FreeMap>,
    inodes: Arc<InodeTable>,
    lock: Arc<Lock>,
}

impl Filesys {
    /// Formats a fresh disk: a new free map, and an empty root
    /// directory.
    ///
    /// # Errors
    /// Propagates a disk I/O failure while writing the root directory's
    /// inode.
    pub fn format(disk: Arc<dyn Disk>) -> Result<Self, FsError> {
        let free_map = Arc::new(FreeMap::format(Arc::clone(&disk)));
        let inodes = Arc::new(InodeTable::new(Arc::clone(&disk), Arc::clone(&free_map)));
        format_root(&inodes)?;
        trace!("filesys: formatted");
        Ok(Self {
            disk,
            free_map,
            inodes,
            lock: Lock::new(),
        })
    }

    /// Reopens a previously formatted filesystem.
    ///
    /// # Errors
    /// Propagates a disk read error reading back the free map.
    pub fn open(disk: Arc<dyn Disk>) -> Result<Self, FsError> {
        let free_map = Arc::new(FreeMap::open(Arc::clone(&disk))?);
        let inodes = Arc::new(InodeTable::new(Arc::clone(&disk), Arc::clone(&free_map)));
        Ok(Self {
            disk,
            free_map,
            inodes,
            lock: Lock::new(),
        })
    }

    fn root(&self) -> Result<Directory, FsError> {
        let inode = self.inodes.open(fs_types::ROOT_DIR_SECTOR)?;
        Ok(Directory::new(inode))
    }

    /// Creates a new zero-length file named `name` in the root
    /// directory.
    ///
    /// # Errors
    /// Returns [`FsError::AlreadyExists`]/[`FsError::InvalidName`] from
    /// the directory add, or propagates free-map/disk failures.
    pub fn create(&self, name: &str, initial_size: u32) -> Result<(), FsError> {
        self.lock.acquire();
        let result = (|| {
            let sector = self.free_map.allocate(1)?;
            self.inodes.create(sector, initial_size)?;
            let root = self.root()?;
            if let Err(e) = root.add(name, sector) {
                self.free_map.release(sector, 1);
                return Err(e);
            }
            Ok(())
        })();
        self.lock.release();
        result
    }

    /// Opens `name` from the root directory.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] if `name` is absent, or propagates
    /// a disk/corruption failure opening its inode.
    pub fn open_file(&self, name: &str) -> Result<File, FsError> {
        self.lock.acquire();
        let result = (|| {
            let root = self.root()?;
            let sector = root.lookup(name).ok_or_else(|| FsError::NotFound(name.into()))?;
            let inode = self.inodes.open(sector)?;
            Ok(File::new(inode, Arc::clone(&self.inodes)))
        })();
        self.lock.release();
        result
    }

    /// Removes `name` from the root directory; the inode's storage is
    /// reclaimed once its last opener closes it.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] if `name` is absent.
    pub fn remove(&self, name: &str) -> Result<(), FsError> {
        self.lock.acquire();
        let result = (|| {
            let root = self.root()?;
            let sector = root.remove(name)?;
            let inode = self.inodes.open(sector)?;
            inode.remove();
            self.inodes.close(&inode);
            Ok(())
        })();
        self.lock.release();
        result
    }

    #[must_use]
    pub fn readdir(&self) -> Vec<String> {
        self.lock.acquire();
        let names = self.root().map(|d| d.readdir()).unwrap_or_default();
        self.lock.release();
        names
    }

    #[must_use]
    pub fn disk(&self) -> &Arc<dyn Disk> {
        &self.disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;

    fn fs() -> Arc<Filesys> {
        let disk = Arc::new(MemDisk::new(512));
        Arc::new(Filesys::format(disk).unwrap())
    }

    #[test]
    fn create_open_write_read() {
        let fs = fs();
        fs.create("a.txt", 0).unwrap();
        let f = fs.open_file("a.txt").unwrap();
        f.write(b"hi").unwrap();
        f.seek(0);
        let mut buf = [0u8; 2];
        f.read(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[test]
    fn remove_then_open_fails() {
        let fs = fs();
        fs.create("a.txt", 0).unwrap();
        fs.remove("a.txt").unwrap();
        assert!(matches!(fs.open_file("a.txt"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn removed_file_storage_is_reclaimed_on_close() {
        let fs = fs();
        fs.create("a.txt", 512).unwrap();
        let f = fs.open_file("a.txt").unwrap();
        fs.remove("a.txt").unwrap();
        drop(f);
        fs.create("b.txt", 512).unwrap();
        assert_eq!(fs.readdir(), vec!["b.txt".to_string()]);
    }
}
