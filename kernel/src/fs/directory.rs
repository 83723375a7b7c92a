//! The flat, single-level directory: a linear array of
//! `fs_types::DirEntry` records stored in an inode's data, supporting
//! lookup, add, remove, and readdir. No subdirectories.

use std::mem::size_of;
use std::sync::Arc;

use dataview::PodMethods as _;
use fs_types::{DirEntry, NAME_MAX, SECTOR_SIZE};

use crate::error::FsError;
use crate::fs::inode::{Inode, InodeTable};

/// A handle onto a directory's backing inode.
pub struct Directory {
    inode: Arc<Inode>,
}

impl Directory {
    #[must_use]
    pub fn new(inode: Arc<Inode>) -> Self {
        Self { inode }
    }

    #[must_use]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    fn entry_count(&self) -> u32 {
        self.inode.length() / size_of::<DirEntry>() as u32
    }

    fn read_entry(&self, index: u32) -> Option<DirEntry> {
        let mut buf = [0u8; size_of::<DirEntry>()];
        let offset = index * size_of::<DirEntry>() as u32;
        let n = self.inode.read_at(&mut buf, offset).ok()?;
        if n != buf.len() {
            return None;
        }
        Some(*buf.as_data_view().get(0))
    }

    fn write_entry(&self, index: u32, entry: &DirEntry) -> Result<(), FsError> {
        let mut buf = [0u8; size_of::<DirEntry>()];
        *buf.as_data_view_mut().get_mut(0) = *entry;
        let offset = index * size_of::<DirEntry>() as u32;
        self.inode.write_at(&buf, offset)?;
        Ok(())
    }

    /// Linear-scans for `name`, returning the inode sector it names.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<u32> {
        for i in 0..self.entry_count() {
            let entry = self.read_entry(i)?;
            if entry.is_in_use() && entry.name_str() == name {
                return Some(entry.inode_sector);
            }
        }
        None
    }

    /// Adds a `name -> sector` entry, reusing the first free (not
    /// in-use) slot before appending a new one, mirroring `dir_add`'s
    /// slot-reuse behaviour.
    ///
    /// # Errors
    /// Returns [`FsError::InvalidName`] if `name` is empty or longer
    /// than [`NAME_MAX`], or [`FsError::AlreadyExists`] if `name` is
    /// already present.
    pub fn add(&self, name: &str, sector: u32) -> Result<(), FsError> {
        if name.is_empty() || name.len() > NAME_MAX {
            return Err(FsError::InvalidName(name.into()));
        }
        if self.lookup(name).is_some() {
            return Err(FsError::AlreadyExists(name.into()));
        }
        let entry = DirEntry::new(sector, name).ok_or_else(|| FsError::InvalidName(name.into()))?;
        let count = self.entry_count();
        for i in 0..count {
            if let Some(existing) = self.read_entry(i) {
                if !existing.is_in_use() {
                    return self.write_entry(i, &entry);
                }
            }
        }
        self.write_entry(count, &entry)
    }

    /// Removes the entry named `name`, clearing its slot for reuse.
    ///
    /// # Errors
    /// Returns [`FsError::NotFound`] if `name` is not present.
    pub fn remove(&self, name: &str) -> Result<u32, FsError> {
        for i in 0..self.entry_count() {
            if let Some(entry) = self.read_entry(i) {
                if entry.is_in_use() && entry.name_str() == name {
                    self.write_entry(i, &DirEntry::empty())?;
                    return Ok(entry.inode_sector);
                }
            }
        }
        Err(FsError::NotFound(name.into()))
    }

    /// Lists every in-use entry's name.
    #[must_use]
    pub fn readdir(&self) -> Vec<String> {
        let mut names = Vec::new();
        for i in 0..self.entry_count() {
            if let Some(entry) = self.read_entry(i) {
                if entry.is_in_use() {
                    names.push(entry.name_str().to_string());
                }
            }
        }
        names
    }
}

/// Formats the root directory's inode (fixed at `ROOT_DIR_SECTOR`) with
/// no entries.
///
/// # Errors
/// Propagates a free-map or disk failure.
pub fn format_root(table: &InodeTable) -> Result<(), FsError> {
    table.create(fs_types::ROOT_DIR_SECTOR, 0)
}

const _: () = assert!(SECTOR_SIZE >= size_of::<DirEntry>());

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;
    use crate::fs::free_map::FreeMap;
    use std::sync::Arc;

    fn root_dir() -> (InodeTable, Directory) {
        let disk = Arc::new(MemDisk::new(256));
        let free_map = Arc::new(FreeMap::format(Arc::clone(&disk) as Arc<dyn crate::disk::Disk>));
        let table = InodeTable::new(disk, free_map);
        format_root(&table).unwrap();
        let inode = table.open(fs_types::ROOT_DIR_SECTOR).unwrap();
        (table, Directory::new(inode))
    }

    #[test]
    fn add_then_lookup_round_trips() {
        let (_table, dir) = root_dir();
        dir.add("foo.txt", 20).unwrap();
        assert_eq!(dir.lookup("foo.txt"), Some(20));
        assert_eq!(dir.lookup("missing"), None);
    }

    #[test]
    fn duplicate_name_rejected() {
        let (_table, dir) = root_dir();
        dir.add("foo.txt", 20).unwrap();
        assert!(matches!(dir.add("foo.txt", 30), Err(FsError::AlreadyExists(_))));
    }

    #[test]
    fn remove_frees_slot_for_reuse() {
        let (_table, dir) = root_dir();
        dir.add("a", 10).unwrap();
        dir.add("b", 11).unwrap();
        dir.remove("a").unwrap();
        dir.add("c", 12).unwrap();
        assert_eq!(dir.readdir().len(), 2);
        assert!(dir.readdir().contains(&"b".to_string()));
        assert!(dir.readdir().contains(&"c".to_string()));
    }

    #[test]
    fn name_too_long_is_rejected() {
        let (_table, dir) = root_dir();
        let long = "x".repeat(NAME_MAX + 1);
        assert!(matches!(dir.add(&long, 10), Err(FsError::InvalidName(_))));
    }
}
