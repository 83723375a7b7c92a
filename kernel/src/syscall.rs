//! The syscall-argument-validation layer: thin wrappers that validate
//! arguments before delegating to [`Process`]/[`Spt`], turning failures
//! into the documented 0/false/-1 returns rather than propagating
//! `Result`s to the caller. There is no separate user address space in
//! this redesign, so buffers are ordinary Rust slices; the validation
//! that matters here is the one case that is process-fatal: a
//! null/kernel-space `mmap` address.

use tracing::warn;

use crate::error::FaultOutcome;
use crate::memory::addr::VirtAddr;
use crate::param::USER_STACK_TOP;
use crate::process::Process;

/// `mmap(addr, length, writable, fd, offset)`: returns the mapped
/// address on success, or `None` on any precondition failure.
#[must_use]
pub fn mmap(proc: &Process, addr: VirtAddr, length: usize, writable: bool, fd: usize, offset: u64) -> Option<VirtAddr> {
    if addr.as_usize() == 0 || !addr.is_page_aligned() || addr.as_usize() >= USER_STACK_TOP {
        warn!(addr = %addr, "mmap: invalid address");
        return None;
    }
    match proc.mmap(addr, length, writable, fd, offset) {
        Some(Ok(addr)) => Some(addr),
        Some(Err(err)) => {
            warn!(%err, "mmap: rejected");
            None
        }
        None => {
            warn!(fd, "mmap: bad file descriptor");
            None
        }
    }
}

/// `munmap(addr)`: no return value; process-fatal failures are reported
/// as [`FaultOutcome::Kill`] rather than panicking.
#[must_use]
pub fn munmap(proc: &Process, addr: VirtAddr) -> FaultOutcome {
    match proc.munmap(addr) {
        Ok(()) => FaultOutcome::Resolved,
        Err(err) => {
            warn!(%err, "munmap: writeback failed");
            FaultOutcome::Kill
        }
    }
}

/// `open(name)`: returns the new descriptor, or `None` on failure.
#[must_use]
pub fn open(proc: &Process, name: &str) -> Option<usize> {
    proc.open(name)
}

/// `create(name, initial_size)`: returns whether creation succeeded.
#[must_use]
pub fn create(proc: &Process, name: &str, initial_size: u32) -> bool {
    proc.create(name, initial_size).is_ok()
}

/// `remove(name)`: returns whether removal succeeded.
#[must_use]
pub fn remove(proc: &Process, name: &str) -> bool {
    proc.remove(name).is_ok()
}

/// `read(fd, buf)`: returns the byte count read, or `-1` if `fd` is not
/// a valid open descriptor.
#[must_use]
pub fn read(proc: &Process, fd: usize, buf: &mut [u8]) -> isize {
    match proc.read(fd, buf) {
        Some(Ok(n)) => n as isize,
        _ => -1,
    }
}

/// `write(fd, buf)`: returns the byte count written, or `-1` if `fd` is
/// not a valid open descriptor.
#[must_use]
pub fn write(proc: &Process, fd: usize, buf: &[u8]) -> isize {
    match proc.write(fd, buf) {
        Some(Ok(n)) => n as isize,
        _ => -1,
    }
}

/// `close(fd)`: no return value.
pub fn close(proc: &Process, fd: usize) {
    proc.close(fd);
}

/// `filesize(fd)`: returns the file length, or `-1` if `fd` is not open.
#[must_use]
pub fn filesize(proc: &Process, fd: usize) -> i64 {
    proc.filesize(fd).map_or(-1, i64::from)
}

/// `seek(fd, pos)`: returns whether `fd` was a valid open descriptor.
#[must_use]
pub fn seek(proc: &Process, fd: usize, pos: u32) -> bool {
    proc.seek(fd, pos)
}

/// `tell(fd)`: returns the current position, or `-1` if `fd` is not
/// open.
#[must_use]
pub fn tell(proc: &Process, fd: usize) -> i64 {
    proc.tell(fd).map_or(-1, i64::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::MemDisk;
    use crate::fs::Filesys;
    use crate::memory::anon::SwapTable;
    use crate::memory::frame::FramePool;
    use crate::param::{NFRAMES, NSWAP_SLOTS, SECTORS_PER_SLOT};
    use std::sync::Arc;

    fn process() -> Process {
        let disk = Arc::new(MemDisk::new(512));
        let fs = Arc::new(Filesys::format(disk).unwrap());
        let frames = Arc::new(FramePool::new(NFRAMES));
        let swap_disk = Arc::new(MemDisk::new((NSWAP_SLOTS * SECTORS_PER_SLOT) as u64));
        let swap = Arc::new(SwapTable::new(swap_disk, NSWAP_SLOTS));
        Process::new(fs, frames, swap)
    }

    #[test]
    fn mmap_rejects_null_and_unaligned() {
        let p = process();
        assert!(mmap(&p, VirtAddr::new(0), 10, true, 2, 0).is_none());
        assert!(mmap(&p, VirtAddr::new(1), 10, true, 2, 0).is_none());
    }

    #[test]
    fn mmap_rejects_bad_fd() {
        let p = process();
        assert!(mmap(&p, VirtAddr::new(0x1000), 10, true, 99, 0).is_none());
    }

    #[test]
    fn create_open_read_write_close_round_trip() {
        let p = process();
        assert!(create(&p, "a.txt", 0));
        let fd = open(&p, "a.txt").unwrap();
        assert_eq!(write(&p, fd, b"hi"), 2);
        assert!(seek(&p, fd, 0));
        let mut buf = [0u8; 2];
        assert_eq!(read(&p, fd, &mut buf), 2);
        assert_eq!(&buf, b"hi");
        close(&p, fd);
        assert_eq!(read(&p, fd, &mut buf), -1);
    }
}
