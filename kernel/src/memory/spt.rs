//! The Supplemental Page Table: the per-address-space authority mapping
//! `va -> Page`. The MMU is a derived cache of this state for resident
//! pages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::VmError;
use crate::memory::addr::{pages_for_len, VirtAddr};
use crate::memory::anon::SwapTable;
use crate::memory::frame::FramePool;
use crate::memory::page::{lazy_load_file_segment, Aux, InitFn, MappedFile, Page, PageCtx, PageKind};
use crate::mmu::Mmu;
use crate::param::PAGE_SIZE;

/// A per-address-space Supplemental Page Table.
pub struct Spt {
    ctx: Arc<PageCtx>,
    pages: Mutex<HashMap<VirtAddr, Arc<Page>>>,
}

impl Spt {
    #[must_use]
    pub fn new(frames: Arc<FramePool>, swap: Arc<SwapTable>) -> Self {
        Self {
            ctx: Arc::new(PageCtx {
                mmu: Arc::new(Mmu::new()),
                frames,
                swap,
            }),
            pages: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn mmu(&self) -> &Arc<Mmu> {
        &self.ctx.mmu
    }

    /// Rounds `va` down to its page and returns the resident entry, if
    /// any.
    #[must_use]
    pub fn find(&self, va: VirtAddr) -> Option<Arc<Page>> {
        self.pages.lock().unwrap().get(&va.round_down()).cloned()
    }

    /// Inserts `page`, keyed by its own `va`. Fails if the key is already
    /// mapped.
    ///
    /// # Errors
    /// Returns [`VmError::AlreadyMapped`] if `page.va()` is already keyed.
    pub fn insert(&self, page: Arc<Page>) -> Result<(), VmError> {
        let mut pages = self.pages.lock().unwrap();
        if pages.contains_key(&page.va()) {
            return Err(VmError::AlreadyMapped(page.va().as_usize()));
        }
        pages.insert(page.va(), page);
        Ok(())
    }

    /// Removes and destroys the entry at `va`, if present.
    ///
    /// # Errors
    /// Propagates a failure from the page's variant-dispatched destructor
    /// (e.g. a writeback I/O error for a dirty FILE page).
    pub fn remove(&self, va: VirtAddr) -> Result<(), VmError> {
        let page = self.pages.lock().unwrap().remove(&va);
        if let Some(page) = page {
            page.destroy()?;
        }
        Ok(())
    }

    /// Destroys every entry. No writeback beyond what each variant's own
    /// destructor requires.
    pub fn kill(&self) {
        let pages: Vec<_> = self.pages.lock().unwrap().drain().map(|(_, p)| p).collect();
        for page in pages {
            let _ = page.destroy();
        }
    }

    /// Deep fork-time copy into `self` from `src`. Returns `false` —
    /// rather than propagating the first error — if any page fails to
    /// copy, since partial state in `self` is acceptable: the caller
    /// tears it down via its own exit path.
    pub fn copy_from(&self, src: &Spt) -> bool {
        let src_pages: Vec<_> = src.pages.lock().unwrap().values().cloned().collect();
        for page in src_pages {
            match page.fork(&self.ctx) {
                Ok(copy) => {
                    if self.insert(copy).is_err() {
                        return false;
                    }
                }
                Err(_) => return false,
            }
        }
        true
    }

    /// `alloc_page_with_initializer`: registers a lazily-loaded page of
    /// eventual kind `kind`, to be populated on first fault.
    ///
    /// # Errors
    /// Returns [`VmError::AlreadyMapped`] if `va` is already mapped.
    pub fn alloc_page_with_initializer(
        &self,
        kind: PageKind,
        va: VirtAddr,
        writable: bool,
        init_fn: Option<InitFn>,
        aux: Aux,
    ) -> Result<(), VmError> {
        let page = Page::new_uninit(va, writable, Arc::clone(&self.ctx), kind, init_fn, aux);
        self.insert(page)
    }

    /// `vm_claim_page`: looks up `va` and claims it (acquire a frame,
    /// install the MMU mapping, dispatch `swap_in`).
    ///
    /// # Errors
    /// Returns [`VmError::Unaligned`] if no page is mapped at `va`'s
    /// rounded-down address (reported as a fault-handler miss upstream);
    /// propagates a claim failure otherwise.
    pub fn claim(&self, va: VirtAddr) -> Result<(), VmError> {
        let page = self.find(va).ok_or(VmError::Unaligned(va.as_usize()))?;
        page.claim()
    }

    /// `do_mmap`: registers one lazily-loaded FILE page per page of
    /// `length`, covering `[addr, addr + ceil(length, page))`.
    ///
    /// # Errors
    /// Returns [`VmError::ZeroLength`], [`VmError::Unaligned`], or
    /// [`VmError::Overlap`] per the stated preconditions.
    pub fn do_mmap(
        &self,
        addr: VirtAddr,
        length: usize,
        writable: bool,
        file: Arc<dyn MappedFile>,
        offset: u64,
    ) -> Result<VirtAddr, VmError> {
        if length == 0 {
            return Err(VmError::ZeroLength);
        }
        if !addr.is_page_aligned() {
            return Err(VmError::Unaligned(addr.as_usize()));
        }
        let npages = pages_for_len(length);
        {
            let pages = self.pages.lock().unwrap();
            for i in 0..npages {
                if pages.contains_key(&addr.byte_add(i * PAGE_SIZE)) {
                    return Err(VmError::Overlap);
                }
            }
        }
        let file = file.reopen();
        let mut remaining = length;
        let mut offset_so_far = offset;
        for i in 0..npages {
            let page_read_bytes = remaining.min(PAGE_SIZE);
            let page_zero_bytes = PAGE_SIZE - page_read_bytes;
            let aux = Aux::File {
                file: Arc::clone(&file),
                offset: offset_so_far,
                read_bytes: page_read_bytes,
                zero_bytes: page_zero_bytes,
                total_len: length,
            };
            self.alloc_page_with_initializer(
                PageKind::File,
                addr.byte_add(i * PAGE_SIZE),
                writable,
                Some(lazy_load_file_segment()),
                aux,
            )?;
            offset_so_far += page_read_bytes as u64;
            remaining -= page_read_bytes;
        }
        Ok(addr)
    }

    /// `do_munmap`: removes every page in the mapping that starts at
    /// `addr`. A no-op if `addr` does not name the start of an active
    /// mapping (see `DESIGN.md`).
    ///
    /// # Errors
    /// Propagates a writeback failure from a dirty page's destructor.
    pub fn do_munmap(&self, addr: VirtAddr) -> Result<(), VmError> {
        let Some(first) = self.find(addr) else {
            return Ok(());
        };
        let Some(total_len) = first.total_mapping_len() else {
            return Ok(());
        };
        let npages = pages_for_len(total_len);
        for i in 0..npages {
            self.remove(addr.byte_add(i * PAGE_SIZE))?;
        }
        Ok(())
    }
}
