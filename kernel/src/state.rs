/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! All kernel-global state syscall dispatch touches: the physical
//! allocator, the root object space and its per-kind slab caches, one
//! scheduler runqueue and hazard word, and the PCI/GSI assignment tables.
//!
//! Simplification recorded in DESIGN.md: one flat object space and one
//! set of slabs rather than per-PD ones, and a single-CPU runqueue/hazard
//! pair. Nothing here forecloses per-PD spaces later — `kobj::Pd` already
//! carries its own `Option<ObjSpace>` for that — this crate just hasn't
//! wired multi-PD dispatch yet.

use crate::gsi::GsiTable;
use crate::pci::PciTable;
use allocator::{PageAllocator, PhysRange};
use kobj::{ObjSpace, SlabCache};
use ptab::Level;
use sched::{Hazards, RunQueue};

pub struct KernelState {
    pub pa: PageAllocator,
    pub objspace: ObjSpace,
    pub pd_slab: SlabCache,
    pub ec_slab: SlabCache,
    pub sc_slab: SlabCache,
    pub pt_slab: SlabCache,
    pub sm_slab: SlabCache,
    pub runqueue: RunQueue,
    pub hazards: Hazards,
    pub gsis: GsiTable,
    pub pci: PciTable,
}

impl KernelState {
    /// # Safety
    /// `memory` must describe free, page-aligned physical memory not
    /// otherwise in use; `obj_root` and `node_root` must each satisfy
    /// [`kobj::objspace::ObjSpace::from_root`]'s contract (typically
    /// freshly zeroed pages out of the same `memory` range) and must not
    /// alias each other.
    pub unsafe fn new(memory: PhysRange, obj_root: *mut Level, node_root: *mut Level) -> Self {
        let pa = PageAllocator::new(memory);
        KernelState {
            objspace: unsafe { ObjSpace::from_root(obj_root, node_root) },
            pd_slab: SlabCache::new::<kobj::Pd>(),
            ec_slab: SlabCache::new::<kobj::Ec>(),
            sc_slab: SlabCache::new::<kobj::Sc>(),
            pt_slab: SlabCache::new::<kobj::Pt>(),
            sm_slab: SlabCache::new::<kobj::Sm>(),
            runqueue: RunQueue::new(),
            hazards: Hazards::new(),
            gsis: GsiTable::new(),
            pci: PciTable::new(),
            pa,
        }
    }
}
