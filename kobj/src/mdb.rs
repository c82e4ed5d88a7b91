/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Mapping database: one node per live delegated capability or memory
//! mapping, linked into a tree (parent, doubly-linked sibling list of
//! children) keyed by (base, order). Grounded on the teacher's
//! `derivation_tree.rs` prev/next-link shape, extended from a flat sibling
//! pair into the full parent/children tree spec.md §4.I describes, and
//! generalized from its packed-`u128` encoding to plain pointers since this
//! core's nodes are heap-allocated structs, not inline capability-table
//! fields.
//!
//! Per-node edits take `lock`; readers (the revoke-safety property in §4.I)
//! never hold it — they load `attrs` with `Acquire` and see either the
//! pre- or post-demotion value, never a torn one, because `attrs` changes
//! with a single atomic store.

use allocator::RawSpinlock;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

pub struct MdbNode {
    lock: RawSpinlock<Links>,
    pub base: u64,
    pub order: u32,
    attrs: AtomicU64,
}

struct Links {
    parent: Option<NonNull<MdbNode>>,
    first_child: Option<NonNull<MdbNode>>,
    prev_sibling: Option<NonNull<MdbNode>>,
    next_sibling: Option<NonNull<MdbNode>>,
}

unsafe impl Send for MdbNode {}
unsafe impl Sync for MdbNode {}

impl MdbNode {
    /// A freshly constructed node with no links; callers attach it with
    /// [`MdbNode::insert_child`] once it has a stable address.
    pub fn new(base: u64, order: u32, attrs: u64) -> Self {
        MdbNode {
            lock: RawSpinlock::new(Links {
                parent: None,
                first_child: None,
                prev_sibling: None,
                next_sibling: None,
            }),
            base,
            order,
            attrs: AtomicU64::new(attrs),
        }
    }

    pub fn attrs(&self) -> u64 {
        self.attrs.load(Ordering::Acquire)
    }

    /// Links `child` as a new first child of `parent`. Both nodes must
    /// already be at their final, stable addresses (pinned allocations).
    ///
    /// # Safety
    /// `parent` and `child` must each outlive the link and must not be
    /// moved while linked.
    pub unsafe fn insert_child(parent: &MdbNode, child: &MdbNode) {
        let parent_ptr = NonNull::from(parent);
        let child_ptr = NonNull::from(child);

        let mut parent_links = parent.lock.lock();
        let old_first = parent_links.first_child;
        parent_links.first_child = Some(child_ptr);
        drop(parent_links);

        let mut child_links = child.lock.lock();
        child_links.parent = Some(parent_ptr);
        child_links.next_sibling = old_first;
        child_links.prev_sibling = None;
        drop(child_links);

        if let Some(mut old_first) = old_first {
            unsafe { old_first.as_mut() }.lock.lock().prev_sibling = Some(child_ptr);
        }
    }

    /// Removes `node` from its parent's sibling list. No-op if it has no
    /// parent (already a root, or already unlinked).
    ///
    /// # Safety
    /// `node` must not be concurrently linked/unlinked from another call.
    unsafe fn unlink(node: &MdbNode) {
        let mut links = node.lock.lock();
        let parent = links.parent.take();
        let prev = links.prev_sibling.take();
        let next = links.next_sibling.take();
        drop(links);

        match prev {
            Some(mut p) => unsafe { p.as_mut() }.lock.lock().next_sibling = next,
            None => {
                if let Some(mut parent) = parent {
                    unsafe { parent.as_mut() }.lock.lock().first_child = next;
                }
            }
        }
        if let Some(mut n) = next {
            unsafe { n.as_mut() }.lock.lock().prev_sibling = prev;
        }
    }

    fn first_child(&self) -> Option<NonNull<MdbNode>> {
        self.lock.lock().first_child
    }

    fn next_sibling(&self) -> Option<NonNull<MdbNode>> {
        self.lock.lock().next_sibling
    }

    /// Depth-first revoke: clears `revoke_mask` from every descendant's
    /// `attrs` (deepest first), then from `self`, invoking `on_demote` with
    /// the node and its post-clear `attrs` after each one — the caller
    /// narrows whatever this node backs (a capability's permission bits, a
    /// mapping's access rights) to match. A node whose `attrs` reaches
    /// zero is additionally unlinked before `on_demote` runs, so the
    /// caller's own teardown (dropping the capability, freeing the node's
    /// backing page) can run inside the same callback.
    ///
    /// # Safety
    /// No concurrent `insert_child`/`revoke` may touch the same subtree.
    pub unsafe fn revoke(node: &MdbNode, revoke_mask: u64, on_demote: &mut dyn FnMut(&MdbNode, u64)) {
        let mut child = node.first_child();
        while let Some(c) = child {
            let c_ref = unsafe { c.as_ref() };
            let next = c_ref.next_sibling();
            unsafe { Self::revoke(c_ref, revoke_mask, on_demote) };
            child = next;
        }

        let new_attrs = node.attrs.fetch_and(!revoke_mask, Ordering::AcqRel) & !revoke_mask;
        if new_attrs == 0 {
            unsafe { Self::unlink(node) };
        }
        on_demote(node, new_attrs);
    }

    /// Like [`revoke`](Self::revoke) but only cascades into `node`'s
    /// children, leaving `node` itself untouched. Used when `node` is a
    /// bare tree anchor with no selector of its own (an object's embedded
    /// root node) — the caller narrows that object's own capability
    /// separately, by whatever means reaches it.
    ///
    /// # Safety
    /// Same as [`revoke`](Self::revoke).
    pub unsafe fn revoke_children(
        node: &MdbNode,
        revoke_mask: u64,
        on_demote: &mut dyn FnMut(&MdbNode, u64),
    ) {
        let mut child = node.first_child();
        while let Some(c) = child {
            let c_ref = unsafe { c.as_ref() };
            let next = c_ref.next_sibling();
            unsafe { Self::revoke(c_ref, revoke_mask, on_demote) };
            child = next;
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;
    use super::*;

    #[test]
    fn revoke_clears_masked_bits_without_touching_others() {
        let parent = MdbNode::new(0x1000, 0, 0b111);
        let mut reclaimed = 0;
        unsafe {
            MdbNode::revoke(&parent, 0b010, &mut |_, attrs| {
                if attrs == 0 {
                    reclaimed += 1
                }
            })
        };
        assert_eq!(parent.attrs(), 0b101);
        assert_eq!(reclaimed, 0);
    }

    #[test]
    fn revoke_to_zero_unlinks_and_reclaims() {
        let root = MdbNode::new(0x1000, 0, 0b1);
        let child = MdbNode::new(0x2000, 0, 0b1);
        unsafe { MdbNode::insert_child(&root, &child) };

        let mut reclaimed = alloc::vec::Vec::new();
        unsafe {
            MdbNode::revoke(&root, 0b1, &mut |n, attrs| {
                if attrs == 0 {
                    reclaimed.push(n.base)
                }
            })
        };

        // Child is demoted to zero before the parent (depth-first), so it
        // reclaims first.
        assert_eq!(reclaimed, alloc::vec![0x2000, 0x1000]);
        assert_eq!(root.first_child(), None);
    }

    #[test]
    fn sibling_removed_from_middle_keeps_neighbours_linked() {
        let root = MdbNode::new(0, 0, 0b1);
        let a = MdbNode::new(1, 0, 0b1);
        let b = MdbNode::new(2, 0, 0b1);
        let c = MdbNode::new(3, 0, 0b1);
        unsafe {
            MdbNode::insert_child(&root, &a);
            MdbNode::insert_child(&root, &b);
            MdbNode::insert_child(&root, &c);
        }
        // Children list is LIFO on insert: c -> b -> a.
        unsafe { MdbNode::revoke(&b, 0b1, &mut |_, _| {}) };

        let first = unsafe { root.first_child().unwrap().as_ref() };
        assert_eq!(first.base, 3);
        let second = unsafe { first.next_sibling().unwrap().as_ref() };
        assert_eq!(second.base, 1);
        assert!(second.next_sibling().is_none());
    }

    #[test]
    fn revoke_children_leaves_the_anchor_itself_untouched() {
        let anchor = MdbNode::new(0, 0, 0);
        let child = MdbNode::new(0x3000, 0, 0b1);
        unsafe { MdbNode::insert_child(&anchor, &child) };

        let mut demoted = alloc::vec::Vec::new();
        unsafe {
            MdbNode::revoke_children(&anchor, 0b1, &mut |n, attrs| demoted.push((n.base, attrs)))
        };

        assert_eq!(demoted, alloc::vec![(0x3000, 0)]);
        assert_eq!(anchor.attrs(), 0);
    }
}
