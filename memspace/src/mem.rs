/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Host, guest and DMA address spaces, all three built over the same
//! [`ptab::Ptab`] engine with kind-specific leaf attribute flavours and
//! bookkeeping.

use crate::cpuset::CpuSet;
use ptab::{Entry, Level, NodeSource, Ptab, WalkError};

/// Input address width and radix depth shared by every space in this crate:
/// 4 levels of 9-bit radix cover the full 48-bit canonical address space,
/// matching the teacher's page-table shape.
pub const IBITS: u32 = 48;
pub const LEVELS: u32 = 4;

type Table = Ptab<IBITS, LEVELS>;

/// What a host address space's [`HstSpace::make_current`] asks the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchAction {
    /// This CPU had not loaded the space before; reload the root pointer (CR3).
    pub reload_root: bool,
    /// This CPU was marked dirty by a prior mapping change; flush its TLB.
    pub flush_tlb: bool,
}

/// A host page-table space (HST): the teacher's per-process kernel/user
/// address space.
pub struct HstSpace {
    table: Table,
    /// CPUs that currently have this space loaded.
    cpus: CpuSet,
    /// CPUs that loaded this space before a mapping changed under them and
    /// so owe it a TLB shoot-down before their next use.
    dirty: CpuSet,
}

impl HstSpace {
    /// # Safety
    /// `root` must satisfy [`Ptab::from_root`]'s contract.
    pub unsafe fn from_root(root: *mut Level) -> Self {
        HstSpace {
            table: unsafe { Table::from_root(root) },
            cpus: CpuSet::new(),
            dirty: CpuSet::new(),
        }
    }

    pub fn lookup(&self, va: u64) -> (u64, u32, Entry) {
        self.table.lookup(va)
    }

    pub fn update<S: NodeSource>(
        &self,
        va: u64,
        leaf: Entry,
        order: u32,
        src: &S,
    ) -> Result<(), WalkError> {
        let r = self.table.update(va, leaf, order, src);
        if r.is_ok() {
            // Every other CPU that had this space loaded now has a stale
            // translation; mark it dirty so its next `make_current` flushes.
            self.dirty.merge(&self.cpus);
        }
        r
    }

    /// Called on context switch. Decides whether `cpu` must reload its root
    /// pointer (first time this CPU runs this space) and/or flush its TLB
    /// (a mapping changed since this CPU last ran this space).
    pub fn make_current(&self, cpu: u32) -> SwitchAction {
        let reload_root = !self.cpus.set(cpu);
        let flush_tlb = self.dirty.chk(cpu);
        if flush_tlb {
            self.dirty.clr(cpu);
        }
        SwitchAction {
            reload_root,
            flush_tlb: flush_tlb && !reload_root,
        }
    }
}

/// A guest page-table space (GST): second-level (EPT/NPT-flavoured)
/// translation for a virtual machine's physical address space.
pub struct GstSpace {
    table: Table,
}

impl GstSpace {
    /// # Safety
    /// `root` must satisfy [`Ptab::from_root`]'s contract.
    pub unsafe fn from_root(root: *mut Level) -> Self {
        GstSpace {
            table: unsafe { Table::from_root(root) },
        }
    }

    pub fn lookup(&self, gpa: u64) -> (u64, u32, Entry) {
        self.table.lookup(gpa)
    }

    pub fn update<S: NodeSource>(
        &self,
        gpa: u64,
        leaf: Entry,
        order: u32,
        src: &S,
    ) -> Result<(), WalkError> {
        self.table.update(gpa, leaf, order, src)
    }
}

/// A DMA address space: IOMMU-facing translation tagged with a
/// stream/domain identifier for targeted invalidation.
pub struct DmaSpace {
    table: Table,
    did: u16,
}

impl DmaSpace {
    /// # Safety
    /// `root` must satisfy [`Ptab::from_root`]'s contract.
    pub unsafe fn from_root(root: *mut Level, did: u16) -> Self {
        DmaSpace {
            table: unsafe { Table::from_root(root) },
            did,
        }
    }

    pub fn did(&self) -> u16 {
        self.did
    }

    pub fn lookup(&self, dma_addr: u64) -> (u64, u32, Entry) {
        self.table.lookup(dma_addr)
    }

    pub fn update<S: NodeSource>(
        &self,
        dma_addr: u64,
        leaf: Entry,
        order: u32,
        src: &S,
    ) -> Result<(), WalkError> {
        self.table.update(dma_addr, leaf, order, src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocator::{PageAllocator, PhysRange};

    extern crate alloc;

    struct Backing {
        ptr: *mut u8,
        layout: alloc::alloc::Layout,
    }

    impl Drop for Backing {
        fn drop(&mut self) {
            unsafe { alloc::alloc::dealloc(self.ptr, self.layout) }
        }
    }

    fn arena(pages: usize) -> (Backing, PageAllocator) {
        let size = pages * ptab::PAGE_SIZE;
        let layout = alloc::alloc::Layout::from_size_align(size, ptab::PAGE_SIZE).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        let pa = PageAllocator::new(PhysRange {
            base: ptr as usize,
            len: size,
        });
        (Backing { ptr, layout }, pa)
    }

    fn new_hst(pa: &PageAllocator) -> HstSpace {
        let root = pa.alloc(0, allocator::Fill::Zero).unwrap();
        unsafe { HstSpace::from_root(root as *mut Level) }
    }

    #[test]
    fn first_load_asks_for_root_reload_only() {
        let (_mem, pa) = arena(64);
        let hst = new_hst(&pa);
        let action = hst.make_current(0);
        assert!(action.reload_root);
        assert!(!action.flush_tlb);
    }

    #[test]
    fn update_dirties_other_cpus_not_the_writer() {
        let (_mem, pa) = arena(64);
        let hst = new_hst(&pa);
        hst.make_current(0);
        hst.make_current(1);
        hst.update(0x1000, Entry::leaf(0x2000, 0x1), 0, &pa).unwrap();

        let action0 = hst.make_current(0);
        assert!(!action0.reload_root);
        assert!(action0.flush_tlb);

        let action1 = hst.make_current(1);
        assert!(!action1.reload_root);
        assert!(action1.flush_tlb);
    }

    #[test]
    fn dma_space_carries_its_domain_id() {
        let (_mem, pa) = arena(64);
        let root = pa.alloc(0, allocator::Fill::Zero).unwrap();
        let dma = unsafe { DmaSpace::from_root(root as *mut Level, 7) };
        assert_eq!(dma.did(), 7);
    }
}
