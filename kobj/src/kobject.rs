/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! The five kernel object kinds (spec.md §3: PD, EC, SC, PT, SM) and the
//! `(kind, subtype?, perm_mask)` capability validation check spec.md §4.F
//! requires, matching the original `Kobject::type()`/`Kobject::perm`
//! pairing of a type tag with a fixed permission mask.

use crate::capability::Capability;
use crate::mdb::MdbNode;
use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Pd,
    Ec,
    Sc,
    Pt,
    Sm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidateError {
    WrongKind,
    WrongSubtype,
    MissingPermission,
    Null,
}

/// Fields common to every kernel object kind: the type/subtype tag fixed at
/// construction, a reference count, and the derivation-tree node anchoring
/// every capability or mapping derived from this object.
pub struct Header {
    pub kind: Kind,
    pub subtype: u8,
    refcount: AtomicU32,
    pub mdb: MdbNode,
}

impl Header {
    pub fn new(kind: Kind, subtype: u8) -> Self {
        Header {
            kind,
            subtype,
            refcount: AtomicU32::new(1),
            mdb: MdbNode::new(0, 0, 0),
        }
    }

    pub fn inc_ref(&self) -> u32 {
        self.refcount.fetch_add(1, Ordering::AcqRel)
    }

    /// Returns the count *after* the decrement; zero means the caller just
    /// dropped the last reference and must, after the current RCU grace
    /// period, free the object's slab slot.
    pub fn dec_ref(&self) -> u32 {
        self.refcount.fetch_sub(1, Ordering::AcqRel) - 1
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }
}

/// Checks a capability against a required `(kind, subtype, perm_mask)`
/// tuple: the referenced object must exist, its tags must match, and the
/// capability's permission bits must be a superset of `perm_mask`.
pub fn validate(
    cap: Capability,
    header: &Header,
    kind: Kind,
    subtype: Option<u8>,
    perm_mask: u64,
) -> Result<(), ValidateError> {
    if cap.is_null() {
        return Err(ValidateError::Null);
    }
    if header.kind != kind {
        return Err(ValidateError::WrongKind);
    }
    if let Some(want) = subtype {
        if header.subtype != want {
            return Err(ValidateError::WrongSubtype);
        }
    }
    if cap.perm() & perm_mask != perm_mask {
        return Err(ValidateError::MissingPermission);
    }
    Ok(())
}

/// Protection domain: owns up to one of each space and the per-PD slab
/// caches for them, plus the FPU-state slab. Spaces are bound once, lazily,
/// on first use and never rebound. `hst`/`pio` are the two every PD that
/// runs native code needs; `obj_space` is this PD's own capability table.
/// Guest-memory, DMA and MSR spaces are optional per-PD extras not carried
/// here directly — a PD that needs one binds it the same way `hst`/`pio`
/// are bound, through the kernel crate that composes these spaces.
///
/// `#[repr(C)]` with `header` first, matching the original's `Kobject` base
/// class sitting at offset 0: a capability's object pointer is a `*Header`,
/// and every kind casts it straight back to its own type.
#[repr(C)]
pub struct Pd {
    pub header: Header,
    pub obj_space: Option<crate::objspace::ObjSpace>,
    pub hst: Option<memspace::HstSpace>,
    pub pio: Option<memspace::PioSpace>,
}

/// Execution context: a thread or vCPU. `partner`/`reverse_cap` carry the
/// live side of an open portal call; `helpers` is the head of the intrusive
/// list of SCs donated to this EC while it is blocked (donation on IPC).
/// `sm_wait_next` links this EC into whichever [`Sm`]'s wait list it is
/// currently blocked on, never more than one at a time.
#[repr(C)]
pub struct Ec {
    pub header: Header,
    pub cpu: u32,
    pub event_base: u64,
    pub state: EcState,
    pub partner: Option<*mut Ec>,
    pub reverse_cap: Option<*mut Ec>,
    pub helpers: Option<*mut Sc>,
    pub sm_wait_next: Option<*mut Ec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcState {
    Running,
    WaitReply,
    Blocked,
}

/// Scheduling context: budget/priority pair bound to exactly one EC,
/// enqueued on exactly one per-CPU runqueue at a time. `link_prev`/
/// `link_next` carry whichever intrusive list currently owns the SC: a
/// priority FIFO on its home CPU's runqueue, or a blocked EC's donation
/// queue — never both, matching the original's single `Queue<Sc>` membership.
#[repr(C)]
pub struct Sc {
    pub header: Header,
    pub priority: u8,
    pub budget: u64,
    pub remaining: u64,
    pub owner: *mut Ec,
    pub cpu: u32,
    pub link_prev: Option<*mut Sc>,
    pub link_next: Option<*mut Sc>,
}

/// Portal: immutable after creation.
#[repr(C)]
pub struct Pt {
    pub header: Header,
    pub owner_ec: *mut Ec,
    pub entry_ip: u64,
    pub mtd_mask: u64,
    pub id: u64,
    pub mtd: u64,
}

/// Semaphore: also the kernel-side endpoint for interrupt delivery.
/// `waiters` is the head of the intrusive, LIFO-linked list (via
/// `Ec::sm_wait_next`) of ECs blocked on a `dn` that found the counter
/// already at or below zero.
#[repr(C)]
pub struct Sm {
    pub header: Header,
    pub counter: i64,
    pub waiters: Option<*mut Ec>,
}

impl Sm {
    /// Parks `ec` on this semaphore's wait list. `ec` must not already be
    /// linked into any wait list.
    pub fn push_waiter(&mut self, ec: *mut Ec) {
        unsafe { (*ec).sm_wait_next = self.waiters };
        self.waiters = Some(ec);
    }

    /// Pops the most recently blocked waiter, if any, unlinking it from
    /// this semaphore's wait list.
    pub fn pop_waiter(&mut self) -> Option<*mut Ec> {
        let ec = self.waiters?;
        self.waiters = unsafe { (*ec).sm_wait_next.take() };
        Some(ec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_null_capability() {
        let header = Header::new(Kind::Pt, 0);
        assert_eq!(
            validate(Capability::null(), &header, Kind::Pt, None, 0b1),
            Err(ValidateError::Null)
        );
    }

    #[test]
    fn validate_rejects_kind_mismatch() {
        let header = Header::new(Kind::Sm, 0);
        let cap = Capability::new(0x2000 as *const (), 0b1);
        assert_eq!(
            validate(cap, &header, Kind::Pt, None, 0b1),
            Err(ValidateError::WrongKind)
        );
    }

    #[test]
    fn validate_rejects_missing_permission_bit() {
        let header = Header::new(Kind::Sm, 0);
        let cap = Capability::new(0x2000 as *const (), 0b01);
        assert_eq!(
            validate(cap, &header, Kind::Sm, None, 0b11),
            Err(ValidateError::MissingPermission)
        );
    }

    #[test]
    fn validate_accepts_superset_permission() {
        let header = Header::new(Kind::Sm, 0);
        let cap = Capability::new(0x2000 as *const (), 0b11);
        assert_eq!(validate(cap, &header, Kind::Sm, None, 0b01), Ok(()));
    }

    #[test]
    fn refcount_reaches_zero_after_matching_dec() {
        let header = Header::new(Kind::Sc, 0);
        header.inc_ref();
        assert_eq!(header.refcount(), 2);
        assert_eq!(header.dec_ref(), 1);
        assert_eq!(header.dec_ref(), 0);
    }

    fn ec() -> Ec {
        Ec {
            header: Header::new(Kind::Ec, 0),
            cpu: 0,
            event_base: 0,
            state: EcState::Blocked,
            partner: None,
            reverse_cap: None,
            helpers: None,
            sm_wait_next: None,
        }
    }

    #[test]
    fn sm_wait_list_pops_in_push_order_for_a_single_waiter() {
        let mut sm = Sm { header: Header::new(Kind::Sm, 0), counter: -1, waiters: None };
        let mut a = ec();
        sm.push_waiter(&mut a as *mut Ec);

        assert_eq!(sm.pop_waiter(), Some(&mut a as *mut Ec));
        assert_eq!(sm.pop_waiter(), None);
    }

    #[test]
    fn sm_wait_list_pops_most_recently_pushed_first() {
        let mut sm = Sm { header: Header::new(Kind::Sm, 0), counter: -2, waiters: None };
        let mut a = ec();
        let mut b = ec();
        sm.push_waiter(&mut a as *mut Ec);
        sm.push_waiter(&mut b as *mut Ec);

        assert_eq!(sm.pop_waiter(), Some(&mut b as *mut Ec));
        assert_eq!(sm.pop_waiter(), Some(&mut a as *mut Ec));
        assert_eq!(sm.pop_waiter(), None);
    }
}
