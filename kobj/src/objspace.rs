/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Sparse capability table keyed by selector, same shape as a page table.
//!
//! `ptab::Ptab::walk` only interprets interior slots (it returns the target
//! slot's raw `AtomicU64` unread, never applying the leaf/table bit-4 tag to
//! it). That lets the object space reuse the engine unmodified even though a
//! capability's permission bits can legitimately set bit 4 — something a
//! page-table leaf never does. The one adapter needed is scaling the
//! selector left by `PAGE_BITS` before it enters `walk`, which cancels the
//! engine's built-in page-offset shift and makes level 0 index the
//! selector's own low bits instead of a page number.

use crate::capability::Capability;
use crate::kobject::Header;
use crate::mdb::MdbNode;
use core::ptr::NonNull;
use core::sync::atomic::Ordering;
use ptab::{Level, NodeSource, WalkError, PAGE_BITS};

/// 3 levels of 9-bit radix: ~2^27 selectors, matching spec.md's "commonly 2-3
/// levels deep" note for the object space.
pub const IBITS: u32 = 39;
pub const LEVELS: u32 = 3;

type Table = ptab::Ptab<IBITS, LEVELS>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjError {
    /// `insert` found a live capability already in the slot.
    BadCap,
    OutOfMemory,
}

impl From<WalkError> for ObjError {
    fn from(e: WalkError) -> Self {
        match e {
            WalkError::OutOfMemory => ObjError::OutOfMemory,
            WalkError::Hole => ObjError::BadCap,
        }
    }
}

/// A capability table plus a second, identically shaped table mapping the
/// same selectors to the [`MdbNode`] that records where each capability was
/// delegated from. Only selectors reached through [`ObjSpace::delegate`]
/// ever gain a `nodes` entry; a capability installed directly by
/// [`ObjSpace::insert`]/[`ObjSpace::update`] has no delegation edge to
/// record and `node_at` reads it back as a hole.
pub struct ObjSpace {
    table: Table,
    nodes: Table,
}

impl ObjSpace {
    /// # Safety
    /// `root` and `node_root` must each satisfy [`ptab::Ptab::from_root`]'s
    /// contract and must not alias each other.
    pub unsafe fn from_root(root: *mut Level, node_root: *mut Level) -> Self {
        ObjSpace {
            table: unsafe { Table::from_root(root) },
            nodes: unsafe { Table::from_root(node_root) },
        }
    }

    #[inline]
    fn v(sel: u64) -> u64 {
        sel << PAGE_BITS
    }

    /// Lock-free read; a missing interior (a "hole") reads as the null
    /// capability, same as a present-but-empty slot.
    pub fn lookup<S: NodeSource>(&self, sel: u64, src: &S) -> Capability {
        match self.table.walk(Self::v(sel), 0, ptab::WalkMode::Hole, src) {
            Ok(slot) => Capability::from_raw(slot.load(Ordering::Acquire)),
            Err(WalkError::Hole) => Capability::null(),
            Err(WalkError::OutOfMemory) => unreachable!("hole mode never allocates"),
        }
    }

    /// Unconditional store. Allocates missing interiors only when `new` is
    /// non-null, preserving the "removal never allocates" invariant.
    /// Returns the capability that occupied the slot before.
    pub fn update<S: NodeSource>(
        &self,
        sel: u64,
        new: Capability,
        src: &S,
    ) -> Result<Capability, ObjError> {
        let mode = if new.is_null() {
            ptab::WalkMode::Hole
        } else {
            ptab::WalkMode::Entry
        };
        let slot = match self.table.walk(Self::v(sel), 0, mode, src) {
            Ok(slot) => slot,
            Err(WalkError::Hole) => return Ok(Capability::null()),
            Err(e) => return Err(e.into()),
        };
        let old = slot.swap(new.raw(), Ordering::AcqRel);
        Ok(Capability::from_raw(old))
    }

    /// Installs `new` only if the slot was null; otherwise returns `BadCap`.
    pub fn insert<S: NodeSource>(
        &self,
        sel: u64,
        new: Capability,
        src: &S,
    ) -> Result<(), ObjError> {
        let slot = self
            .table
            .walk(Self::v(sel), 0, ptab::WalkMode::Entry, src)?;
        slot.compare_exchange(0, new.raw(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ObjError::BadCap)
    }

    /// Looks up the [`MdbNode`] recording a prior delegation into `sel`, if
    /// any. A selector installed directly by [`ObjSpace::insert`]/
    /// [`ObjSpace::update`] was never itself a delegation target and reads
    /// back as `None`; callers that need *some* node to anchor further
    /// delegation fall back to the capability's own object header, whose
    /// embedded root [`MdbNode`] covers every right the object was created
    /// with.
    pub fn node_at<S: NodeSource>(&self, sel: u64, src: &S) -> Option<NonNull<MdbNode>> {
        let slot = self.nodes.walk(Self::v(sel), 0, ptab::WalkMode::Hole, src).ok()?;
        NonNull::new(slot.load(Ordering::Acquire) as *mut MdbNode)
    }

    fn bind_node<S: NodeSource>(
        &self,
        sel: u64,
        node: *mut MdbNode,
        src: &S,
    ) -> Result<(), ObjError> {
        let slot = self
            .nodes
            .walk(Self::v(sel), 0, ptab::WalkMode::Entry, src)?;
        slot.store(node as u64, Ordering::Release);
        Ok(())
    }

    /// Copies `2^order` consecutive capabilities from `src_base` in `self`
    /// to `dst_base` in `dst`, intersecting each with `perm_mask`, and links
    /// each copy into the mapping database as a new child of whichever node
    /// governs the source capability. One freshly allocated page hosts each
    /// delegated capability's `MdbNode` — one page per edge rather than a
    /// dense slab, the same fixed-granularity simplification this tree
    /// already makes elsewhere.
    pub fn delegate<S: NodeSource>(
        &self,
        src_base: u64,
        dst: &ObjSpace,
        dst_base: u64,
        order: u32,
        perm_mask: u64,
        alloc: &S,
    ) -> Result<(), ObjError> {
        for i in 0..(1u64 << order) {
            let cap = self.lookup(src_base + i, alloc);
            if cap.is_null() {
                continue;
            }
            let narrowed = cap.with_perm(perm_mask);
            dst.update(dst_base + i, narrowed, alloc)?;

            let parent = self.node_at(src_base + i, alloc).unwrap_or_else(|| unsafe {
                NonNull::from(&(*(cap.obj() as *const Header)).mdb)
            });

            let page = alloc.alloc_zeroed().ok_or(ObjError::OutOfMemory)?;
            let child = page as *mut MdbNode;
            unsafe {
                child.write(MdbNode::new(dst_base + i, 0, narrowed.perm()));
                MdbNode::insert_child(parent.as_ref(), &*child);
            }
            dst.bind_node(dst_base + i, child, alloc)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocator::{PageAllocator, PhysRange};

    extern crate alloc;

    fn arena(pages: usize) -> (alloc::alloc::Layout, *mut u8, PageAllocator) {
        let size = pages * ptab::PAGE_SIZE;
        let layout = alloc::alloc::Layout::from_size_align(size, ptab::PAGE_SIZE).unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        let pa = PageAllocator::new(PhysRange {
            base: ptr as usize,
            len: size,
        });
        (layout, ptr, pa)
    }

    fn new_space(pa: &PageAllocator) -> ObjSpace {
        let root = pa.alloc(0, allocator::Fill::Zero).unwrap();
        let node_root = pa.alloc(0, allocator::Fill::Zero).unwrap();
        unsafe { ObjSpace::from_root(root as *mut Level, node_root as *mut Level) }
    }

    #[test]
    fn missing_selector_reads_as_null() {
        let (layout, backing, pa) = arena(64);
        let os = new_space(&pa);
        assert!(os.lookup(12345, &pa).is_null());
        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn insert_then_lookup_round_trips_and_rejects_double_insert() {
        let (layout, backing, pa) = arena(64);
        let os = new_space(&pa);
        let cap = Capability::new(0x8000 as *const (), 0b11);
        os.insert(7, cap, &pa).unwrap();
        assert_eq!(os.lookup(7, &pa), cap);
        assert_eq!(os.insert(7, cap, &pa), Err(ObjError::BadCap));
        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn permission_bit_4_does_not_get_misread_as_a_table_pointer() {
        let (layout, backing, pa) = arena(64);
        let os = new_space(&pa);
        // perm = 0b11111 sets every low bit including bit 4.
        let cap = Capability::new(0x9000 as *const (), 0b11111);
        os.update(9, cap, &pa).unwrap();
        assert_eq!(os.lookup(9, &pa), cap);
        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn update_to_null_never_allocates_a_fresh_interior() {
        let (layout, backing, pa) = arena(64);
        let os = new_space(&pa);
        // A selector whose interior tables were never touched: removing is
        // a no-op, not an allocation.
        let prior = os.update(999, Capability::null(), &pa).unwrap();
        assert!(prior.is_null());
        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    fn new_header(kind: crate::kobject::Kind) -> (alloc::alloc::Layout, *mut Header) {
        let layout = alloc::alloc::Layout::from_size_align(core::mem::size_of::<Header>(), 32)
            .unwrap();
        let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) } as *mut Header;
        unsafe { ptr.write(Header::new(kind, 0)) };
        (layout, ptr)
    }

    #[test]
    fn delegate_copies_with_narrowed_permissions() {
        let (layout, backing, pa) = arena(64);
        let src = new_space(&pa);
        let dst = new_space(&pa);
        let (hdr_layout, hdr_ptr) = new_header(crate::kobject::Kind::Sm);
        let cap = Capability::new(hdr_ptr as *const (), 0b111);
        src.insert(0, cap, &pa).unwrap();
        src.delegate(0, &dst, 100, 0, 0b011, &pa).unwrap();
        assert_eq!(dst.lookup(100, &pa).perm(), 0b011);
        assert_eq!(dst.lookup(100, &pa).obj(), cap.obj());
        unsafe {
            alloc::alloc::dealloc(hdr_ptr as *mut u8, hdr_layout);
            alloc::alloc::dealloc(backing, layout);
        }
    }

    #[test]
    fn delegate_links_a_revoke_cascading_mdb_node() {
        let (layout, backing, pa) = arena(64);
        let src = new_space(&pa);
        let dst = new_space(&pa);
        let (hdr_layout, hdr_ptr) = new_header(crate::kobject::Kind::Sm);
        let header = unsafe { &*hdr_ptr };

        let cap = Capability::new(hdr_ptr as *const (), 0b011);
        src.insert(0, cap, &pa).unwrap();
        src.delegate(0, &dst, 100, 0, 0b011, &pa).unwrap();
        assert!(dst.node_at(100, &pa).is_some());

        let mut cleared = 0;
        unsafe {
            MdbNode::revoke(&header.mdb, 0b011, &mut |n, attrs| {
                dst.update(n.base, Capability::new(core::ptr::null(), attrs), &pa)
                    .unwrap();
                if attrs == 0 {
                    cleared += 1;
                }
            });
        }
        assert_eq!(cleared, 1);
        assert!(dst.lookup(100, &pa).is_null());

        unsafe {
            alloc::alloc::dealloc(hdr_ptr as *mut u8, hdr_layout);
            alloc::alloc::dealloc(backing, layout);
        }
    }
}
