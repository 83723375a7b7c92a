//! A process's user-visible resources: its address space (an [`Spt`]) and
//! its open-file-descriptor table. Descriptors 0 and 1 are reserved for
//! the console and never assigned to a real file, mirroring
//! `param::NOFILE`'s layout.

use std::sync::{Arc, Mutex};

use arrayvec::ArrayVec;

use crate::error::{FsError, VmError};
use crate::fs::{File, Filesys};
use crate::memory::addr::VirtAddr;
use crate::memory::anon::SwapTable;
use crate::memory::frame::FramePool;
use crate::memory::page::MappedFile;
use crate::memory::spt::Spt;
use crate::param::NOFILE;

const FIRST_USER_FD: usize = 2;

/// One process's address space plus its open files.
pub struct Process {
    pub spt: Spt,
    fs: Arc<Filesys>,
    fds: Mutex<ArrayVec<Option<File>, NOFILE>>,
}

impl Process {
    #[must_use]
    pub fn new(fs: Arc<Filesys>, frames: Arc<FramePool>, swap: Arc<SwapTable>) -> Self {
        let mut fds = ArrayVec::new();
        for _ in 0..NOFILE {
            fds.push(None);
        }
        Self {
            spt: Spt::new(frames, swap),
            fs,
            fds: Mutex::new(fds),
        }
    }

    /// Opens `name`, installing it at the lowest free descriptor at or
    /// above [`FIRST_USER_FD`]. Returns `None` if the table is full or
    /// the file does not exist.
    pub fn open(&self, name: &str) -> Option<usize> {
        let file = self.fs.open_file(name).ok()?;
        let mut fds = self.fds.lock().unwrap();
        let slot = fds.iter().skip(FIRST_USER_FD).position(Option::is_none)? + FIRST_USER_FD;
        fds[slot] = Some(file);
        Some(slot)
    }

    /// Closes `fd`, dropping its `File` (which releases any deny-write
    /// and closes the underlying inode once its last opener drops).
    pub fn close(&self, fd: usize) {
        if fd < FIRST_USER_FD {
            return;
        }
        if let Some(slot) = self.fds.lock().unwrap().get_mut(fd) {
            *slot = None;
        }
    }

    fn with_file<T>(&self, fd: usize, f: impl FnOnce(&File) -> T) -> Option<T> {
        if fd < FIRST_USER_FD {
            return None;
        }
        let fds = self.fds.lock().unwrap();
        let file = fds.get(fd)?.as_ref()?;
        Some(f(file))
    }

    /// # Errors
    /// Propagates a disk I/O error. Returns `None` if `fd` is not open.
    pub fn read(&self, fd: usize, buf: &mut [u8]) -> Option<Result<usize, FsError>> {
        let fds = self.fds.lock().unwrap();
        let file = fds.get(fd)?.as_ref()?;
        Some(file.read(buf))
    }

    /// # Errors
    /// Propagates a disk I/O error. Returns `None` if `fd` is not open.
    pub fn write(&self, fd: usize, buf: &[u8]) -> Option<Result<usize, FsError>> {
        let fds = self.fds.lock().unwrap();
        let file = fds.get(fd)?.as_ref()?;
        Some(file.write(buf))
    }

    #[must_use]
    pub fn filesize(&self, fd: usize) -> Option<u32> {
        self.with_file(fd, File::length)
    }

    pub fn seek(&self, fd: usize, pos: u32) -> bool {
        self.with_file(fd, |f| f.seek(pos)).is_some()
    }

    #[must_use]
    pub fn tell(&self, fd: usize) -> Option<u32> {
        self.with_file(fd, File::tell)
    }

    /// # Errors
    /// Propagates directory-add or free-map failures.
    pub fn create(&self, name: &str, initial_size: u32) -> Result<(), FsError> {
        self.fs.create(name, initial_size)
    }

    /// # Errors
    /// Returns [`FsError::NotFound`] if `name` does not exist.
    pub fn remove(&self, name: &str) -> Result<(), FsError> {
        self.fs.remove(name)
    }

    /// Maps `fd`'s backing file at `addr`. Returns `None` if `fd` does
    /// not name an open file.
    ///
    /// # Errors
    /// Propagates `do_mmap`'s precondition failures.
    pub fn mmap(
        &self,
        addr: VirtAddr,
        length: usize,
        writable: bool,
        fd: usize,
        offset: u64,
    ) -> Option<Result<VirtAddr, VmError>> {
        let fds = self.fds.lock().unwrap();
        let file = fds.get(fd)?.as_ref()?;
        let mapped: Arc<dyn MappedFile> = file.reopen();
        drop(fds);
        Some(self.spt.do_mmap(addr, length, writable, mapped, offset))
    }

    /// # Errors
    /// Propagates a writeback failure during unmap.
    pub fn munmap(&self, addr: VirtAddr) -> Result<(), VmError> {
        self.spt.do_munmap(addr)
    }

    /// Creates a child process with its own copy of this one's address
    /// space and its own duplicate of every open file descriptor,
    /// mirroring the parent/child independence `fork` promises: after
    /// the call, neither process's writes are visible through the
    /// other's descriptors or anonymous pages. `frames` and `swap` are
    /// the child's frame pool and swap device, normally the same pools
    /// the parent itself runs on.
    ///
    /// Returns the child alongside whether the address-space copy fully
    /// succeeded; a `false` means the caller should tear the child down
    /// rather than schedule it.
    #[must_use]
    pub fn fork(&self, frames: Arc<FramePool>, swap: Arc<SwapTable>) -> (Self, bool) {
        let child = Self::new(Arc::clone(&self.fs), frames, swap);
        let ok = child.spt.copy_from(&self.spt);
        let parent_fds = self.fds.lock().unwrap();
        let mut child_fds = child.fds.lock().unwrap();
        for (slot, child_slot) in parent_fds.iter().zip(child_fds.iter_mut()) {
            if let Some(file) = slot {
                *child_slot = Some(file.dup());
            }
        }
        drop(parent_fds);
        drop(child_fds);
        (child, ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;
    use crate::param::{NFRAMES, NSWAP_SLOTS, SECTORS_PER_SLOT};

    fn process() -> Process {
        let disk = Arc::new(MemDisk::new(512));
        let fs = Arc::new(Filesys::format(disk).unwrap());
        let frames = Arc::new(FramePool::new(NFRAMES));
        let swap_disk = Arc::new(MemDisk::new((NSWAP_SLOTS * SECTORS_PER_SLOT) as u64));
        let swap = Arc::new(SwapTable::new(swap_disk, NSWAP_SLOTS));
        Process::new(fs, frames, swap)
    }

    #[test]
    fn open_assigns_lowest_free_fd_above_reserved() {
        let p = process();
        p.create("a.txt", 0).unwrap();
        p.create("b.txt", 0).unwrap();
        let fd_a = p.open("a.txt").unwrap();
        assert_eq!(fd_a, FIRST_USER_FD);
        let fd_b = p.open("b.txt").unwrap();
        assert_eq!(fd_b, FIRST_USER_FD + 1);
        p.close(fd_a);
        let fd_c = p.open("a.txt").unwrap();
        assert_eq!(fd_c, FIRST_USER_FD);
    }

    #[test]
    fn read_write_round_trip_through_fd() {
        let p = process();
        p.create("a.txt", 0).unwrap();
        let fd = p.open("a.txt").unwrap();
        p.write(fd, b"hello").unwrap().unwrap();
        p.seek(fd, 0);
        let mut buf = [0u8; 5];
        p.read(fd, &mut buf).unwrap().unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn reserved_descriptors_are_never_assigned() {
        let p = process();
        assert!(p.with_file(0, |_| ()).is_none());
        assert!(p.with_file(1, |_| ()).is_none());
    }

    #[test]
    fn fork_duplicates_fds_with_independent_cursors() {
        let p = process();
        p.create("a.txt", 0).unwrap();
        let fd = p.open("a.txt").unwrap();
        p.write(fd, b"hello").unwrap().unwrap();
        p.seek(fd, 0);

        let child_frames = Arc::new(FramePool::new(NFRAMES));
        let child_swap_disk = Arc::new(MemDisk::new((NSWAP_SLOTS * SECTORS_PER_SLOT) as u64));
        let child_swap = Arc::new(SwapTable::new(child_swap_disk, NSWAP_SLOTS));
        let (child, ok) = p.fork(child_frames, child_swap);
        assert!(ok);

        // Child's descriptor reads the same content but its cursor moves
        // independently of the parent's.
        let mut child_buf = [0u8; 3];
        child.read(fd, &mut child_buf).unwrap().unwrap();
        assert_eq!(&child_buf, b"hel");
        assert_eq!(child.tell(fd).unwrap(), 3);
        assert_eq!(p.tell(fd).unwrap(), 0);
    }
}
