//! The page-fault handler: validation, the stack-growth heuristic, and
//! resolution via SPT lookup + claim. This is the chokepoint that turns a
//! failed resolution into a process-fatal exit.

use tracing::{trace, warn};

use crate::error::FaultOutcome;
use crate::memory::addr::VirtAddr;
use crate::memory::page::{Aux, PageKind};
use crate::memory::spt::Spt;
use crate::param::{PAGE_SIZE, STACK_FAULT_SLACK, STACK_GROWTH_WINDOW, USER_STACK_TOP};

/// The information a trap frame gives the fault handler.
#[derive(Debug, Clone, Copy)]
pub struct FaultInfo {
    pub addr: VirtAddr,
    pub is_user: bool,
    pub is_write: bool,
    pub not_present: bool,
    pub rsp: VirtAddr,
}

/// Whether `addr` falls in the stack-growth window below the fixed stack
/// top and within `STACK_FAULT_SLACK` bytes of `rsp` (accommodating a
/// `push`'s pre-decrement).
#[must_use]
fn is_stack_growth_candidate(addr: VirtAddr, rsp: VirtAddr) -> bool {
    let stack_top = USER_STACK_TOP;
    if addr.as_usize() >= stack_top {
        return false;
    }
    let window_bottom = stack_top.saturating_sub(STACK_GROWTH_WINDOW);
    if addr.as_usize() < window_bottom {
        return false;
    }
    addr.distance(rsp) <= STACK_FAULT_SLACK
}

/// Resolves a page fault against `spt`: null/kernel-space and protection
/// faults are process-fatal; a fault inside the stack-growth window with
/// no SPT entry grows the stack; otherwise the fault resolves via SPT
/// lookup + claim.
#[must_use]
pub fn handle(spt: &Spt, info: FaultInfo) -> FaultOutcome {
    if info.addr.as_usize() == 0 || !info.is_user {
        warn!(addr = %info.addr, "fault: null or kernel-space address");
        return FaultOutcome::Kill;
    }
    if !info.not_present {
        warn!(addr = %info.addr, "fault: protection fault, no COW hook");
        return FaultOutcome::Kill;
    }

    let rounded = info.addr.round_down();
    if spt.find(rounded).is_none() {
        if is_stack_growth_candidate(info.addr, info.rsp) {
            trace!(addr = %info.addr, "fault: growing stack");
            if spt
                .alloc_page_with_initializer(PageKind::Anon, rounded, true, None, Aux::None)
                .is_err()
            {
                return FaultOutcome::Kill;
            }
        } else {
            warn!(addr = %info.addr, "fault: no SPT entry, not a stack-growth candidate");
            return FaultOutcome::Kill;
        }
    }

    let Some(page) = spt.find(rounded) else {
        return FaultOutcome::Kill;
    };
    if info.is_write && !page.writable() {
        warn!(addr = %info.addr, "fault: write to read-only page");
        return FaultOutcome::Kill;
    }
    match spt.claim(rounded) {
        Ok(()) => FaultOutcome::Resolved,
        Err(err) => {
            warn!(addr = %info.addr, %err, "fault: claim failed");
            FaultOutcome::Kill
        }
    }
}
