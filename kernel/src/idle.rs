/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Idle loop: the per-exit servicing spec.md describes, run when there is
//! nothing else to schedule. Drains the hazard word, drains the
//! allocator's deferred-free queue, then asks the runqueue for the next SC.

use crate::state::KernelState;
use core::ptr::NonNull;
use kobj::Sc;
use sched::Hazard;

/// `SCHED` is driven by this function's own subsequent `runqueue.schedule()`
/// call and `RECALL` by the trap-exit path; the remaining bits are
/// collaborator-layer state (`hal`'s FPU/segment/TSC reload) this crate
/// does not reach into. `Hazards::service` clears every bit regardless of
/// what its handler does, so a no-op handler still drains the word.
fn service_hazard(_hazard: Hazard) {}

/// Runs one idle iteration, returning the SC newly made current if the
/// runqueue had one to hand out.
pub fn step(state: &mut KernelState) -> Option<NonNull<Sc>> {
    state.hazards.service(service_hazard);
    state.pa.drain();
    state.runqueue.schedule()
}

/// Parks the CPU until the next interrupt, running [`step`] on every
/// wakeup. Never returns; `kernel_main` tail-calls into this once boot and
/// root-task dispatch are done.
pub fn run(state: &mut KernelState) -> ! {
    loop {
        step(state);
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocator::PhysRange;

    extern crate alloc;

    fn arena(pages: usize) -> (alloc::alloc::Layout, *mut u8) {
        let size = pages * ptab::PAGE_SIZE;
        let layout = alloc::alloc::Layout::from_size_align(size, ptab::PAGE_SIZE).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        (layout, ptr)
    }

    #[test]
    fn step_drains_hazards_and_reports_no_work_when_runqueue_is_empty() {
        let (layout, backing) = arena(8);
        let memory = PhysRange { base: backing as usize, len: 8 * ptab::PAGE_SIZE };
        let (root, node_root) = unsafe {
            let pa = allocator::PageAllocator::new(memory);
            let root = pa.alloc(0, allocator::Fill::Zero).unwrap();
            let node_root = pa.alloc(0, allocator::Fill::Zero).unwrap();
            (root, node_root)
        };
        let mut state = unsafe {
            KernelState::new(memory, root as *mut ptab::Level, node_root as *mut ptab::Level)
        };
        state.hazards.raise(Hazard::SCHED | Hazard::RCU);

        let scheduled = step(&mut state);

        assert!(scheduled.is_none());
        assert!(state.hazards.pending().is_empty());

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }
}
