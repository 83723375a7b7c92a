//! End-to-end scenarios driven through the public `Process`/syscall
//! surface rather than a single module's internals: a fork that must
//! leave parent and child with independent anonymous pages, an mmap
//! whose dirty page survives a writeback round trip, and a swap storm
//! that outlives the frame pool without losing a byte.

use std::sync::Arc;

use kernel::disk::MemDisk;
use kernel::fs::Filesys;
use kernel::memory::addr::VirtAddr;
use kernel::memory::anon::SwapTable;
use kernel::memory::frame::FramePool;
use kernel::memory::page::{Aux, PageKind};
use kernel::param::{NFRAMES, NSWAP_SLOTS, PAGE_SIZE, SECTORS_PER_SLOT};
use kernel::Process;

fn harness() -> (Arc<Filesys>, Arc<FramePool>, Arc<SwapTable>) {
    let disk = Arc::new(MemDisk::new(1024));
    let fs = Arc::new(Filesys::format(disk).unwrap());
    let frames = Arc::new(FramePool::new(NFRAMES));
    let swap_disk = Arc::new(MemDisk::new((NSWAP_SLOTS * SECTORS_PER_SLOT) as u64));
    let swap = Arc::new(SwapTable::new(swap_disk, NSWAP_SLOTS));
    (fs, frames, swap)
}

/// Claims `va` and writes one byte into its frame directly, simulating a
/// user store (there is no real user address space to fault through in
/// this harness). Marks the PTE dirty the way real hardware would.
fn write_byte(process: &Process, va: VirtAddr, byte: u8) {
    process.spt.claim(va).unwrap();
    let rounded = va.round_down();
    let ptr = process.spt.mmu().frame_ptr(rounded).expect("resident after claim");
    unsafe {
        *(ptr as *mut u8).add(va.offset_in_page()) = byte;
    }
    process.spt.mmu().mark_dirty(rounded);
}

/// Claims `va` and reads one byte back out of its frame.
fn read_byte(process: &Process, va: VirtAddr) -> u8 {
    process.spt.claim(va).unwrap();
    let rounded = va.round_down();
    let ptr = process.spt.mmu().frame_ptr(rounded).expect("resident after claim");
    unsafe { *(ptr as *const u8).add(va.offset_in_page()) }
}

#[test]
fn anon_fork_gives_child_an_independent_copy() {
    let (fs, frames, swap) = harness();
    let parent = Process::new(fs, frames, swap);
    let va = VirtAddr::new(0x0804_8000);
    parent
        .spt
        .alloc_page_with_initializer(PageKind::Anon, va, true, None, Aux::None)
        .unwrap();
    write_byte(&parent, va, 0xAB);

    let child_frames = Arc::new(FramePool::new(NFRAMES));
    let child_swap_disk = Arc::new(MemDisk::new((NSWAP_SLOTS * SECTORS_PER_SLOT) as u64));
    let child_swap = Arc::new(SwapTable::new(child_swap_disk, NSWAP_SLOTS));
    let (child, copied) = parent.fork(child_frames, child_swap);
    assert!(copied);

    assert_eq!(read_byte(&child, va), 0xAB);

    write_byte(&parent, va, 0xCD);
    assert_eq!(read_byte(&parent, va), 0xCD);
    assert_eq!(read_byte(&child, va), 0xAB);
}

#[test]
fn mmap_write_back_round_trip_through_munmap() {
    let (fs, frames, swap) = harness();
    fs.create("f", 600).unwrap();
    let process = Process::new(Arc::clone(&fs), frames, swap);
    let fd = process.open("f").unwrap();
    let addr = VirtAddr::new(0x2000_0000);
    process.mmap(addr, 600, true, fd, 0).unwrap().unwrap();

    write_byte(&process, VirtAddr::new(addr.as_usize() + 513), 0x5A);
    process.munmap(addr).unwrap();

    let verify_fd = process.open("f").unwrap();
    process.seek(verify_fd, 513);
    let mut one = [0u8; 1];
    process.read(verify_fd, &mut one).unwrap().unwrap();
    assert_eq!(one[0], 0x5A);

    process.seek(verify_fd, 0);
    process.read(verify_fd, &mut one).unwrap().unwrap();
    assert_eq!(one[0], 0x00);
}

#[test]
fn file_mmap_reads_match_underlying_file_contents() {
    let (fs, frames, swap) = harness();
    fs.create("g", PAGE_SIZE as u32).unwrap();
    {
        let writer = fs.open_file("g").unwrap();
        let pattern: Vec<u8> = (0..PAGE_SIZE).map(|i| (i % 251) as u8).collect();
        writer.write(&pattern).unwrap();
    }
    let process = Process::new(Arc::clone(&fs), frames, swap);
    let fd = process.open("g").unwrap();
    let addr = VirtAddr::new(0x3000_0000);
    process.mmap(addr, PAGE_SIZE, false, fd, 0).unwrap().unwrap();

    for offset in (0..PAGE_SIZE).step_by(37) {
        let want = (offset % 251) as u8;
        assert_eq!(read_byte(&process, VirtAddr::new(addr.as_usize() + offset)), want);
    }
}

#[test]
fn munmap_only_writes_back_the_page_that_was_dirtied() {
    let (fs, frames, swap) = harness();
    fs.create("h", (2 * PAGE_SIZE) as u32).unwrap();
    {
        let writer = fs.open_file("h").unwrap();
        writer.write(&vec![0x11u8; 2 * PAGE_SIZE]).unwrap();
    }
    let process = Process::new(Arc::clone(&fs), frames, swap);
    let fd = process.open("h").unwrap();
    let addr = VirtAddr::new(0x4000_0000);
    process.mmap(addr, 2 * PAGE_SIZE, true, fd, 0).unwrap().unwrap();

    // Page 1 is faulted in read-only (never stored to) and must come back
    // untouched; page 0 gets one dirtied byte.
    let _ = read_byte(&process, VirtAddr::new(addr.as_usize() + PAGE_SIZE));
    write_byte(&process, addr, 0x99);

    process.munmap(addr).unwrap();

    let verify_fd = process.open("h").unwrap();
    let mut buf = vec![0u8; 2 * PAGE_SIZE];
    process.read(verify_fd, &mut buf).unwrap().unwrap();
    assert_eq!(buf[0], 0x99);
    assert!(buf[1..PAGE_SIZE].iter().all(|&b| b == 0x11));
    assert!(buf[PAGE_SIZE..].iter().all(|&b| b == 0x11));
}

#[test]
fn swap_storm_preserves_every_page_past_pool_capacity() {
    let disk = Arc::new(MemDisk::new(256));
    let fs = Arc::new(Filesys::format(disk).unwrap());
    let frames = Arc::new(FramePool::new(4));
    let swap_disk = Arc::new(MemDisk::new((16 * SECTORS_PER_SLOT) as u64));
    let swap = Arc::new(SwapTable::new(swap_disk, 16));
    let process = Process::new(fs, frames, swap);

    const N: usize = 10;
    let base = 0x1000_0000usize;
    for i in 0..N {
        let va = VirtAddr::new(base + i * PAGE_SIZE);
        process
            .spt
            .alloc_page_with_initializer(PageKind::Anon, va, true, None, Aux::None)
            .unwrap();
        for b in 0..4 {
            write_byte(&process, VirtAddr::new(va.as_usize() + b), i as u8);
        }
    }
    for i in 0..N {
        let va = VirtAddr::new(base + i * PAGE_SIZE);
        for b in 0..4 {
            assert_eq!(read_byte(&process, VirtAddr::new(va.as_usize() + b)), i as u8);
        }
    }
}
