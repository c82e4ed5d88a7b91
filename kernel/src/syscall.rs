/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Syscall dispatch: spec.md §6's 14-entry table, `F validates capabilities
//! via D → G runs IPC state machine → H schedules` in one function.
//!
//! Simplifications recorded in DESIGN.md:
//! - `revoke`'s `arg1` is the permission-bit mask to clear and walks the
//!   mapping-database tree rooted at `sel` ([`kobj::MdbNode::revoke`]),
//!   narrowing every descendant born of a `delegate` call; a selector that
//!   was never itself a delegation target has no node of its own; its own
//!   capability is narrowed directly and its children (if it was a
//!   delegation *source*) cascade through the object's embedded root node.
//! - `sm_ctrl`'s blocking `dn` parks the calling EC on the `Sm`'s wait list
//!   and moves it to [`kobj::EcState::Blocked`]; `up` pops the oldest
//!   waiter, wakes it, and re-enqueues every SC donated to it while
//!   blocked. Actually suspending the hardware thread across the context
//!   switch is the trap-entry/scheduler collaboration in `kernel::idle`,
//!   outside dispatch's scope.
//! - `ec_ctrl`'s RECALL hazard is raised unconditionally on the target EC's
//!   (single, CPU-local) hazard word — cross-CPU IPI delivery is out of
//!   scope.
//! - `assign_pci`/`assign_gsi` go through the fixed-size [`crate::pci`]/
//!   [`crate::gsi`] tables rather than kobj-capability-typed objects.

use crate::state::KernelState;
use kobj::{Capability, Header, Kind, MdbNode, ObjError, ValidateError};
use sched::{ipc, Hazard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Leaf {
    Call = 0,
    Reply = 1,
    CreatePd = 2,
    CreateEc = 3,
    CreateSc = 4,
    CreatePt = 5,
    CreateSm = 6,
    Revoke = 7,
    Lookup = 8,
    EcCtrl = 9,
    ScCtrl = 10,
    SmCtrl = 11,
    AssignPci = 12,
    AssignGsi = 13,
}

impl Leaf {
    pub fn from_u64(v: u64) -> Option<Self> {
        Some(match v {
            0 => Leaf::Call,
            1 => Leaf::Reply,
            2 => Leaf::CreatePd,
            3 => Leaf::CreateEc,
            4 => Leaf::CreateSc,
            5 => Leaf::CreatePt,
            6 => Leaf::CreateSm,
            7 => Leaf::Revoke,
            8 => Leaf::Lookup,
            9 => Leaf::EcCtrl,
            10 => Leaf::ScCtrl,
            11 => Leaf::SmCtrl,
            12 => Leaf::AssignPci,
            13 => Leaf::AssignGsi,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Status {
    Success = 0,
    Timeout = 1,
    BadHyp = 2,
    BadCap = 3,
    BadPar = 4,
    BadFtr = 5,
    BadCpu = 6,
    BadDev = 7,
    InsMem = 8,
    MemObj = 9,
    MemCap = 10,
    Aborted = 11,
}

impl From<ObjError> for Status {
    fn from(e: ObjError) -> Self {
        match e {
            ObjError::BadCap => Status::BadCap,
            ObjError::OutOfMemory => Status::InsMem,
        }
    }
}

impl From<ValidateError> for Status {
    fn from(_: ValidateError) -> Self {
        Status::BadCap
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs {
    pub sel: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
}

/// Looks up `sel` in `state`'s root object space and validates it against
/// `(kind, subtype, perm_mask)`, translating both the objspace miss and the
/// kind/permission mismatch into one [`Status`].
fn require<'a>(
    state: &'a KernelState,
    sel: u64,
    kind: Kind,
    subtype: Option<u8>,
    perm_mask: u64,
) -> Result<(Capability, &'a Header), Status> {
    let cap = state.objspace.lookup(sel, &state.pa);
    if cap.is_null() {
        return Err(Status::BadCap);
    }
    let header = unsafe { &*(cap.obj() as *const Header) };
    kobj::validate(cap, header, kind, subtype, perm_mask).map_err(Status::from)?;
    Ok((cap, header))
}

/// Allocates a slab slot, writes `value` into it, and inserts a capability
/// to it at `dst_sel` in the caller's object space.
unsafe fn create<T>(
    state: &mut KernelState,
    slab: impl FnOnce(&mut KernelState) -> Result<*mut u8, allocator::OutOfMemory>,
    dst_sel: u64,
    perm: u64,
    value: T,
) -> Result<(), Status> {
    let ptr = slab(state).map_err(|_| Status::InsMem)?;
    let typed = ptr as *mut T;
    unsafe { typed.write(value) };
    let cap = Capability::new(typed as *const (), perm);
    state
        .objspace
        .insert(dst_sel, cap, &state.pa)
        .map_err(Status::from)
}

/// Dispatches one syscall. `caller_ec` is the EC that trapped in; `out`
/// receives up to three result words on [`Status::Success`].
pub fn dispatch(
    state: &mut KernelState,
    caller_ec: &mut kobj::Ec,
    leaf: Leaf,
    args: SyscallArgs,
    out: &mut [u64; 3],
) -> Status {
    match leaf {
        Leaf::Call => {
            let (_cap, header) = match require(state, args.sel, Kind::Pt, None, 0b1) {
                Ok(v) => v,
                Err(s) => return s,
            };
            let pt = unsafe { &*(header as *const Header as *const kobj::Pt) };
            let callee = unsafe { &mut *pt.owner_ec };
            match ipc::call(caller_ec, callee) {
                Ok(()) => Status::Success,
                Err(_) => Status::BadCpu,
            }
        }
        Leaf::Reply => match ipc::reply(caller_ec) {
            Ok(_caller) => Status::Success,
            Err(_) => Status::BadCap,
        },
        Leaf::CreatePd => unsafe {
            let value = kobj::Pd {
                header: Header::new(Kind::Pd, 0),
                obj_space: None,
                hst: None,
                pio: None,
            };
            match create(state, |s| s.pd_slab.alloc(&s.pa), args.sel, args.arg1, value) {
                Ok(()) => Status::Success,
                Err(s) => s,
            }
        },
        Leaf::CreateEc => unsafe {
            let value = kobj::Ec {
                header: Header::new(Kind::Ec, 0),
                cpu: args.arg2 as u32,
                event_base: args.arg3,
                state: kobj::EcState::Running,
                partner: None,
                reverse_cap: None,
                helpers: None,
                sm_wait_next: None,
            };
            match create(state, |s| s.ec_slab.alloc(&s.pa), args.sel, args.arg1, value) {
                Ok(()) => Status::Success,
                Err(s) => s,
            }
        },
        Leaf::CreateSc => unsafe {
            let priority = (args.arg2 & 0xff) as u8;
            if priority as usize >= sched::PRIORITIES {
                return Status::BadPar;
            }
            let value = kobj::Sc {
                header: Header::new(Kind::Sc, 0),
                priority,
                budget: args.arg3,
                remaining: args.arg3,
                owner: core::ptr::null_mut(),
                cpu: 0,
                link_prev: None,
                link_next: None,
            };
            match create(state, |s| s.sc_slab.alloc(&s.pa), args.sel, args.arg1, value) {
                Ok(()) => Status::Success,
                Err(s) => s,
            }
        },
        Leaf::CreatePt => {
            let (_cap, header) = match require(state, args.arg1, Kind::Ec, None, 0) {
                Ok(v) => v,
                Err(s) => return s,
            };
            let owner_ec = header as *const Header as *mut kobj::Ec;
            unsafe {
                let value = kobj::Pt {
                    header: Header::new(Kind::Pt, 0),
                    owner_ec,
                    entry_ip: args.arg2,
                    mtd_mask: args.arg3,
                    id: 0,
                    mtd: 0,
                };
                match create(state, |s| s.pt_slab.alloc(&s.pa), args.sel, 0b1, value) {
                    Ok(()) => Status::Success,
                    Err(s) => s,
                }
            }
        }
        Leaf::CreateSm => unsafe {
            let value = kobj::Sm {
                header: Header::new(Kind::Sm, 0),
                counter: args.arg1 as i64,
                waiters: None,
            };
            match create(state, |s| s.sm_slab.alloc(&s.pa), args.sel, 0b1, value) {
                Ok(()) => Status::Success,
                Err(s) => s,
            }
        },
        Leaf::Revoke => {
            let count = 1u64 << args.arg2.min(32);
            let objspace = &state.objspace;
            let pa = &state.pa;
            for i in 0..count {
                let sel = args.sel + i;
                let cap = objspace.lookup(sel, pa);
                if cap.is_null() {
                    continue;
                }
                let demote = &mut |n: &MdbNode, new_attrs: u64| {
                    let old = objspace.lookup(n.base, pa);
                    let _ = objspace.update(n.base, Capability::new(old.obj(), new_attrs), pa);
                };
                match objspace.node_at(sel, pa) {
                    Some(node) => unsafe { MdbNode::revoke(node.as_ref(), args.arg1, demote) },
                    None => {
                        let header = unsafe { &*(cap.obj() as *const Header) };
                        unsafe { MdbNode::revoke_children(&header.mdb, args.arg1, demote) };
                        let narrowed = Capability::new(cap.obj(), cap.perm() & !args.arg1);
                        let _ = objspace.update(sel, narrowed, pa);
                    }
                }
            }
            Status::Success
        }
        Leaf::Lookup => {
            let cap = state.objspace.lookup(args.sel, &state.pa);
            out[0] = cap.raw();
            Status::Success
        }
        Leaf::EcCtrl => {
            if let Err(s) = require(state, args.sel, Kind::Ec, None, 0) {
                return s;
            }
            state.hazards.raise(Hazard::RECALL);
            Status::Success
        }
        Leaf::ScCtrl => {
            let (_cap, header) = match require(state, args.sel, Kind::Sc, None, 0) {
                Ok(v) => v,
                Err(s) => return s,
            };
            let sc = unsafe { &*(header as *const Header as *const kobj::Sc) };
            out[0] = sc.budget - sc.remaining;
            Status::Success
        }
        Leaf::SmCtrl => {
            let (_cap, header) = match require(state, args.sel, Kind::Sm, None, 0) {
                Ok(v) => v,
                Err(s) => return s,
            };
            let sm = unsafe { &mut *(header as *const Header as *mut kobj::Sm) };
            let up = args.arg1 != 0;
            if up {
                sm.counter += 1;
                if let Some(waiter) = sm.pop_waiter() {
                    let waiter = unsafe { &mut *waiter };
                    for sc in ipc::unblock(waiter) {
                        state.runqueue.enqueue(sc);
                    }
                }
                Status::Success
            } else {
                sm.counter -= 1;
                if sm.counter < 0 {
                    sm.push_waiter(caller_ec as *mut kobj::Ec);
                    ipc::block(caller_ec);
                }
                Status::Success
            }
        }
        Leaf::AssignPci => {
            if args.arg1 > u8::MAX as u64 {
                return Status::BadPar;
            }
            state.pci.assign(args.sel as u8, args.arg1 as u16, args.arg2 as u8);
            Status::Success
        }
        Leaf::AssignGsi => {
            if args.sel > u8::MAX as u64 {
                return Status::BadPar;
            }
            let (_cap, header) = match require(state, args.arg1, Kind::Sm, None, 0) {
                Ok(v) => v,
                Err(s) => return s,
            };
            let sm = header as *const Header as *mut kobj::Sm;
            state.gsis.assign(args.sel as u8, sm, args.arg2 as u32);
            Status::Success
        }
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

    fn new_state(pages: usize) -> (alloc::alloc::Layout, *mut u8, KernelState) {
        let (layout, backing) = arena(pages);
        let memory = PhysRange { base: backing as usize, len: pages * ptab::PAGE_SIZE };
        let (root, node_root) = unsafe {
            let pa = allocator::PageAllocator::new(memory);
            let root = pa.alloc(0, allocator::Fill::Zero).unwrap();
            let node_root = pa.alloc(0, allocator::Fill::Zero).unwrap();
            (root, node_root)
        };
        let state = unsafe {
            KernelState::new(memory, root as *mut ptab::Level, node_root as *mut ptab::Level)
        };
        (layout, backing, state)
    }

    fn root_ec() -> kobj::Ec {
        kobj::Ec {
            header: Header::new(Kind::Ec, 0),
            cpu: 0,
            event_base: 0,
            state: kobj::EcState::Running,
            partner: None,
            reverse_cap: None,
            helpers: None,
            sm_wait_next: None,
        }
    }

    #[test]
    fn create_sm_then_lookup_round_trips() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        let status = dispatch(
            &mut state,
            &mut ec,
            Leaf::CreateSm,
            SyscallArgs { sel: 5, arg1: 0, arg2: 0, arg3: 0 },
            &mut out,
        );
        assert_eq!(status, Status::Success);

        let status = dispatch(
            &mut state,
            &mut ec,
            Leaf::Lookup,
            SyscallArgs { sel: 5, arg1: 0, arg2: 0, arg3: 0 },
            &mut out,
        );
        assert_eq!(status, Status::Success);
        assert_ne!(out[0], 0);

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn lookup_of_an_empty_selector_does_not_fail_the_syscall() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        let status = dispatch(
            &mut state,
            &mut ec,
            Leaf::Lookup,
            SyscallArgs { sel: 77, arg1: 0, arg2: 0, arg3: 0 },
            &mut out,
        );
        assert_eq!(status, Status::Success);
        assert_eq!(out[0], 0);

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn sm_ctrl_down_below_zero_blocks_the_caller() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        dispatch(&mut state, &mut ec, Leaf::CreateSm, SyscallArgs { sel: 1, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        let status = dispatch(&mut state, &mut ec, Leaf::SmCtrl, SyscallArgs { sel: 1, arg1: 0, arg2: 0, arg3: 0 }, &mut out);

        assert_eq!(status, Status::Success);
        assert_eq!(ec.state, kobj::EcState::Blocked);

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn sm_ctrl_up_wakes_the_ec_blocked_by_sm_ctrl_down() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        dispatch(&mut state, &mut ec, Leaf::CreateSm, SyscallArgs { sel: 1, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        dispatch(&mut state, &mut ec, Leaf::SmCtrl, SyscallArgs { sel: 1, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_eq!(ec.state, kobj::EcState::Blocked);

        let mut waker = root_ec();
        let status = dispatch(&mut state, &mut waker, Leaf::SmCtrl, SyscallArgs { sel: 1, arg1: 1, arg2: 0, arg3: 0 }, &mut out);

        assert_eq!(status, Status::Success);
        assert_eq!(ec.state, kobj::EcState::Running);

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn ec_ctrl_raises_recall() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        dispatch(&mut state, &mut ec, Leaf::CreateEc, SyscallArgs { sel: 2, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        let status = dispatch(&mut state, &mut ec, Leaf::EcCtrl, SyscallArgs { sel: 2, arg1: 0, arg2: 0, arg3: 0 }, &mut out);

        assert_eq!(status, Status::Success);
        assert!(state.hazards.pending().contains(Hazard::RECALL));

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn revoke_clears_every_selector_in_the_range() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        dispatch(&mut state, &mut ec, Leaf::CreateSm, SyscallArgs { sel: 40, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        dispatch(&mut state, &mut ec, Leaf::CreateSm, SyscallArgs { sel: 41, arg1: 0, arg2: 0, arg3: 0 }, &mut out);

        let status = dispatch(&mut state, &mut ec, Leaf::Revoke, SyscallArgs { sel: 40, arg1: 0b1, arg2: 1, arg3: 0 }, &mut out);
        assert_eq!(status, Status::Success);

        dispatch(&mut state, &mut ec, Leaf::Lookup, SyscallArgs { sel: 40, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_eq!(out[0], 0);
        dispatch(&mut state, &mut ec, Leaf::Lookup, SyscallArgs { sel: 41, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_eq!(out[0], 0);

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    /// Spec §8 scenario 2: PD_x delegates on to PD_y, and revoking at the
    /// root must cascade through every descendant the delegation chain
    /// produced, not just the selector the caller named directly.
    #[test]
    fn revoke_cascades_through_delegated_capabilities() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        dispatch(&mut state, &mut ec, Leaf::CreateSm, SyscallArgs { sel: 50, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        state.objspace.delegate(50, &state.objspace, 60, 0, 0b1, &state.pa).unwrap();
        state.objspace.delegate(60, &state.objspace, 70, 0, 0b1, &state.pa).unwrap();

        dispatch(&mut state, &mut ec, Leaf::Lookup, SyscallArgs { sel: 60, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_ne!(out[0], 0);
        dispatch(&mut state, &mut ec, Leaf::Lookup, SyscallArgs { sel: 70, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_ne!(out[0], 0);

        let status = dispatch(&mut state, &mut ec, Leaf::Revoke, SyscallArgs { sel: 50, arg1: 0b1, arg2: 0, arg3: 0 }, &mut out);
        assert_eq!(status, Status::Success);

        dispatch(&mut state, &mut ec, Leaf::Lookup, SyscallArgs { sel: 50, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_eq!(out[0], 0);
        dispatch(&mut state, &mut ec, Leaf::Lookup, SyscallArgs { sel: 60, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_eq!(out[0], 0);
        dispatch(&mut state, &mut ec, Leaf::Lookup, SyscallArgs { sel: 70, arg1: 0, arg2: 0, arg3: 0 }, &mut out);
        assert_eq!(out[0], 0);

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }

    #[test]
    fn assign_pci_records_the_device() {
        let (layout, backing, mut state) = new_state(8);
        let mut ec = root_ec();
        let mut out = [0u64; 3];

        let status = dispatch(&mut state, &mut ec, Leaf::AssignPci, SyscallArgs { sel: 3, arg1: 0x0800, arg2: 1, arg3: 0 }, &mut out);
        assert_eq!(status, Status::Success);
        assert_eq!(state.pci.device(3).unwrap().bdf, 0x0800);

        unsafe { alloc::alloc::dealloc(backing, layout) };
    }
}
