//! `Page`: the tagged-union address-space entry. The discriminant lives
//! in `variant`; per-variant `swap_in`/`swap_out`/`destroy` dispatch is
//! an explicit `match` rather than open inheritance, a sum type plus a
//! match where that is cheaper than a vtable.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::error::VmError;
use crate::memory::addr::VirtAddr;
use crate::memory::anon::SwapTable;
use crate::memory::frame::{Frame, FramePool, Resident};
use crate::mmu::Mmu;
use crate::param::PAGE_SIZE;

/// A file-like backing store a `FILE` page reads/writes against. Kept
/// generic so `memory` does not depend on `fs` directly.
pub trait MappedFile: Send + Sync {
    /// Reads up to `buf.len()` bytes at `offset`, returning the count
    /// actually read (short on EOF).
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, VmError>;

    /// Writes `buf` at `offset`.
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<(), VmError>;

    /// Returns an independent handle over the same underlying file, with
    /// its own cursor — what `do_mmap` uses so the mapping owns its own
    /// file reference.
    fn reopen(&self) -> Arc<dyn MappedFile>;
}

/// The concrete variant an `UNINIT` page will transmute into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum PageKind {
    Anon,
    File,
    /// Reserved for a readahead/writeback daemon; out of active scope.
    /// Transmuting into this variant zero-fills the frame and nothing
    /// else — there is no daemon to drive readahead.
    PageCache,
}

/// The parameter block an `UNINIT` page carries until its first fault.
#[derive(Clone)]
pub enum Aux {
    None,
    File {
        file: Arc<dyn MappedFile>,
        offset: u64,
        read_bytes: usize,
        zero_bytes: usize,
        total_len: usize,
    },
}

/// The lazy loader invoked once, right after transmutation, with the
/// newly resident frame and the same `aux` the page was allocated with.
pub type InitFn = Arc<dyn Fn(&Page, &Aux, &mut [u8; PAGE_SIZE]) -> bool + Send + Sync>;

enum Variant {
    Uninit {
        type_after_init: PageKind,
        init_fn: Option<InitFn>,
        aux: Aux,
    },
    Anon {
        swap_slot: Option<usize>,
    },
    File {
        file: Arc<dyn MappedFile>,
        file_offset: u64,
        read_bytes: usize,
        zero_bytes: usize,
        total_len: usize,
    },
    PageCache,
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninit { type_after_init, .. } => {
                write!(f, "Uninit(-> {type_after_init:?})")
            }
            Self::Anon { swap_slot } => write!(f, "Anon(slot={swap_slot:?})"),
            Self::File { file_offset, .. } => write!(f, "File(offset={file_offset})"),
            Self::PageCache => write!(f, "PageCache"),
        }
    }
}

/// Shared collaborators every page in one address space needs to
/// claim/evict/destroy itself: the simulated MMU, the process-wide frame
/// pool, and the process-wide anon-swap table.
pub struct PageCtx {
    pub mmu: Arc<Mmu>,
    pub frames: Arc<FramePool>,
    pub swap: Arc<SwapTable>,
}

/// One mapped user virtual page. Lives inside an `Arc` so the frame pool
/// can hold a type-erased [`Resident`] handle to it for eviction.
pub struct Page {
    va: VirtAddr,
    writable: bool,
    ctx: Arc<PageCtx>,
    frame: Mutex<Option<Frame>>,
    variant: Mutex<Variant>,
}

impl Page {
    #[must_use]
    pub fn new_uninit(
        va: VirtAddr,
        writable: bool,
        ctx: Arc<PageCtx>,
        type_after_init: PageKind,
        init_fn: Option<InitFn>,
        aux: Aux,
    ) -> Arc<Self> {
        Arc::new(Self {
            va,
            writable,
            ctx,
            frame: Mutex::new(None),
            variant: Mutex::new(Variant::Uninit {
                type_after_init,
                init_fn,
                aux,
            }),
        })
    }

    #[must_use]
    pub fn va(&self) -> VirtAddr {
        self.va
    }

    #[must_use]
    pub fn writable(&self) -> bool {
        self.writable
    }

    #[must_use]
    pub fn is_resident(&self) -> bool {
        self.frame.lock().unwrap().is_some()
    }

    /// Acquires a frame (if not already resident), installs the MMU
    /// mapping, and dispatches `swap_in` for the active variant.
    ///
    /// # Errors
    /// Propagates [`VmError::FrameExhausted`] or a swap-in failure.
    pub fn claim(self: &Arc<Self>) -> Result<(), VmError> {
        if self.is_resident() {
            return Ok(());
        }
        let mut frame = self.ctx.frames.acquire(Arc::clone(self) as Arc<dyn Resident>)?;
        self.ctx.mmu.map(self.va, frame.kva(), self.writable);
        let result = self.swap_in(frame.as_bytes_mut());
        *self.frame.lock().unwrap() = Some(frame);
        if result.is_err() {
            self.ctx.mmu.unmap(self.va);
        }
        result
    }

    /// Dispatches the variant's swap-in behaviour. `bytes` is the
    /// already-acquired, already-mapped frame.
    fn swap_in(&self, bytes: &mut [u8; PAGE_SIZE]) -> Result<(), VmError> {
        let mut variant = self.variant.lock().unwrap();
        match &mut *variant {
            Variant::Uninit {
                type_after_init,
                init_fn,
                aux,
            } => {
                // Fetch before overwriting `*variant`: `page_initializer`
                // may transmute the discriminant out from under us.
                let kind = *type_after_init;
                let init_fn = init_fn.take();
                let aux = std::mem::replace(aux, Aux::None);
                *variant = match (kind, &aux) {
                    (PageKind::Anon, _) => Variant::Anon { swap_slot: None },
                    (
                        PageKind::File,
                        Aux::File {
                            file,
                            offset,
                            read_bytes,
                            zero_bytes,
                            total_len,
                        },
                    ) => Variant::File {
                        file: Arc::clone(file),
                        file_offset: *offset,
                        read_bytes: *read_bytes,
                        zero_bytes: *zero_bytes,
                        total_len: *total_len,
                    },
                    (PageKind::File, Aux::None) => return Err(VmError::Overlap),
                    (PageKind::PageCache, _) => Variant::PageCache,
                };
                drop(variant);
                if let Some(init_fn) = init_fn {
                    if !init_fn(self, &aux, bytes) {
                        return Err(VmError::Overlap);
                    }
                }
                Ok(())
            }
            Variant::Anon { swap_slot } => {
                if let Some(slot) = swap_slot.take() {
                    self.ctx.swap.swap_in(slot, bytes)?;
                }
                Ok(())
            }
            Variant::File {
                file,
                file_offset,
                read_bytes,
                zero_bytes,
                ..
            } => {
                let n = file.read_at(&mut bytes[..*read_bytes], *file_offset)?;
                bytes[n..*read_bytes].fill(0);
                bytes[*read_bytes..*read_bytes + *zero_bytes].fill(0);
                Ok(())
            }
            Variant::PageCache => {
                bytes.fill(0);
                Ok(())
            }
        }
    }

    /// Swaps out (if resident) to the variant's backing store and
    /// detaches the frame. Idempotent: a no-op if already non-resident.
    fn swap_out(&self) -> Result<(), VmError> {
        let mut frame_guard = self.frame.lock().unwrap();
        let Some(frame) = frame_guard.take() else {
            return Ok(());
        };
        drop(frame_guard);
        self.ctx.mmu.unmap(self.va);
        let mut variant = self.variant.lock().unwrap();
        let result = match &mut *variant {
            Variant::Uninit { .. } => unreachable!("an UNINIT page is never resident"),
            Variant::Anon { swap_slot } => {
                let slot = self.ctx.swap.swap_out(frame.as_bytes())?;
                *swap_slot = Some(slot);
                Ok(())
            }
            Variant::File {
                file,
                file_offset,
                read_bytes,
                ..
            } => {
                if self.ctx.mmu.is_dirty(self.va) && self.writable {
                    file.write_at(&frame.as_bytes()[..*read_bytes], *file_offset)?;
                    self.ctx.mmu.clear_dirty(self.va);
                }
                Ok(())
            }
            Variant::PageCache => Ok(()),
        };
        drop(variant);
        self.ctx.frames.release();
        trace!(va = %self.va, "page: evicted");
        result
    }

    /// Variant-dispatched destructor, run by `spt_remove`/`spt_kill`.
    /// For a `FILE` page this is exactly `do_munmap`'s per-page cleanup:
    /// writeback-if-dirty-and-writable, then detach.
    pub fn destroy(&self) -> Result<(), VmError> {
        self.swap_out()?;
        if let Variant::Anon { swap_slot: Some(slot) } = &*self.variant.lock().unwrap() {
            self.ctx.swap.free(*slot);
        }
        Ok(())
    }

    #[must_use]
    pub fn total_mapping_len(&self) -> Option<usize> {
        match &*self.variant.lock().unwrap() {
            Variant::File { total_len, .. } => Some(*total_len),
            _ => None,
        }
    }

    #[must_use]
    pub fn read_bytes_len(&self) -> Option<usize> {
        match &*self.variant.lock().unwrap() {
            Variant::File { read_bytes, .. } => Some(*read_bytes),
            _ => None,
        }
    }

    #[must_use]
    pub fn file_offset(&self) -> Option<u64> {
        match &*self.variant.lock().unwrap() {
            Variant::File { file_offset, .. } => Some(*file_offset),
            _ => None,
        }
    }

    /// Deep-copies this page into `dst_ctx`'s address space at the same
    /// `va`, per variant fork rules.
    pub fn fork(&self, dst_ctx: &Arc<PageCtx>) -> Result<Arc<Page>, VmError> {
        let variant = &*self.variant.lock().unwrap();
        match variant {
            Variant::Uninit {
                type_after_init,
                init_fn,
                aux,
            } => Ok(Page::new_uninit(
                self.va,
                self.writable,
                Arc::clone(dst_ctx),
                *type_after_init,
                init_fn.clone(),
                aux.clone(),
            )),
            Variant::Anon { swap_slot } => {
                // Eagerly claim and byte-copy; ANON pages are never shared
                // across processes, no copy-on-write.
                let dst = Page::new_uninit(
                    self.va,
                    self.writable,
                    Arc::clone(dst_ctx),
                    PageKind::Anon,
                    None,
                    Aux::None,
                );
                dst.claim()?;
                let mut buf = [0u8; PAGE_SIZE];
                if let Some(slot) = *swap_slot {
                    self.ctx.swap.peek(slot, &mut buf)?;
                } else if let Some(frame) = self.frame.lock().unwrap().as_ref() {
                    buf.copy_from_slice(frame.as_bytes());
                }
                dst.frame
                    .lock()
                    .unwrap()
                    .as_mut()
                    .expect("just claimed")
                    .as_bytes_mut()
                    .copy_from_slice(&buf);
                Ok(dst)
            }
            Variant::File {
                file,
                file_offset,
                read_bytes,
                zero_bytes,
                total_len,
            } => {
                let aux = Aux::File {
                    file: file.reopen(),
                    offset: *file_offset,
                    read_bytes: *read_bytes,
                    zero_bytes: *zero_bytes,
                    total_len: *total_len,
                };
                Ok(Page::new_uninit(
                    self.va,
                    self.writable,
                    Arc::clone(dst_ctx),
                    PageKind::File,
                    Some(lazy_load_file_segment()),
                    aux,
                ))
            }
            Variant::PageCache => Ok(Page::new_uninit(
                self.va,
                self.writable,
                Arc::clone(dst_ctx),
                PageKind::PageCache,
                None,
                Aux::None,
            )),
        }
    }

}

impl Resident for Page {
    fn evict(&self) -> Result<(), VmError> {
        self.swap_out()
    }
}

/// The lazy loader for a `FILE` page: read `read_bytes` from the mapped
/// file at the stored offset, zero the rest. Shared by `do_mmap` and
/// fork's FILE-page re-materialization.
#[must_use]
pub fn lazy_load_file_segment() -> InitFn {
    Arc::new(|_page, aux, bytes| {
        let Aux::File {
            file,
            offset,
            read_bytes,
            zero_bytes,
            ..
        } = aux
        else {
            return false;
        };
        match file.read_at(&mut bytes[..*read_bytes], *offset) {
            Ok(n) => {
                bytes[n..*read_bytes].fill(0);
                bytes[*read_bytes..*read_bytes + *zero_bytes].fill(0);
                true
            }
            Err(_) => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;
    use crate::disk::MemDisk;
    use crate::param::{NFRAMES, NSWAP_SLOTS, SECTORS_PER_SLOT};

    fn ctx() -> Arc<PageCtx> {
        let disk = Arc::new(MemDisk::new((NSWAP_SLOTS * SECTORS_PER_SLOT) as u64));
        Arc::new(PageCtx {
            mmu: Arc::new(Mmu::new()),
            frames: Arc::new(FramePool::new(NFRAMES)),
            swap: Arc::new(SwapTable::new(disk, NSWAP_SLOTS)),
        })
    }

    /// Every variant that can transmute with no `Aux` claims cleanly and
    /// ends up resident. `PageKind::File` is excluded: it requires an
    /// `Aux::File` parameter block, covered separately by the mmap tests.
    #[test]
    fn every_aux_none_kind_claims_and_becomes_resident() {
        for (i, kind) in PageKind::iter().filter(|k| *k != PageKind::File).enumerate() {
            let ctx = ctx();
            let va = VirtAddr::new(0x1000 * (i + 1));
            let page = Page::new_uninit(va, true, ctx, kind, None, Aux::None);
            page.claim().unwrap();
            assert!(page.is_resident());
        }
    }
}
