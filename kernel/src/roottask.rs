/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Root-task bootstrap: constructs the boot PD/EC/SC and installs the
//! fixed root capabilities `Space_obj::insert_root` pre-loads into every
//! boot image — PD self, the boot EC/SC pair, one SM per routed GSI, and
//! the root PD's host-memory and PIO spaces — matching the HIP's `sel_*`
//! fields. The root console capability `Space_obj::insert_root` also
//! installs has no `kobj` object behind it yet and stays out of scope.

use crate::state::KernelState;
use allocator::Fill;
use core::ptr::NonNull;
use kobj::{Capability, Header, Kind};
use memspace::{HstSpace, PioSpace};

pub const SEL_PD_SELF: u64 = 0;
pub const SEL_EC_ROOT: u64 = 1;
pub const SEL_SC_ROOT: u64 = 2;
pub const SEL_GSI_BASE: u64 = 16;

/// Handles to the boot objects dispatch needs once the root task starts
/// trapping in.
pub struct RootTask {
    pub ec: *mut kobj::Ec,
    pub sc: NonNull<kobj::Sc>,
    pub gsi_count: u32,
}

/// # Safety
/// Must run exactly once, before any syscall dispatch, on a freshly built
/// [`KernelState`] whose slabs and object space are otherwise untouched —
/// selectors 0..16+`gsi_count` must still be free.
pub unsafe fn bootstrap(state: &mut KernelState, gsi_count: u32) -> RootTask {
    let hst_root = state.pa.alloc(0, Fill::Zero).expect("boot allocation must succeed");
    let hst = unsafe { HstSpace::from_root(hst_root as *mut ptab::Level) };
    let pio = PioSpace::new(&state.pa).expect("boot allocation must succeed");

    let pd_ptr = state.pd_slab.alloc(&state.pa).expect("boot allocation must succeed") as *mut kobj::Pd;
    unsafe {
        pd_ptr.write(kobj::Pd {
            header: Header::new(Kind::Pd, 0),
            obj_space: None,
            hst: Some(hst),
            pio: Some(pio),
        })
    };
    let pd_cap = Capability::new(pd_ptr as *const (), 0b1);
    state
        .objspace
        .insert(SEL_PD_SELF, pd_cap, &state.pa)
        .expect("selector SEL_PD_SELF is free at boot");

    let ec_ptr = state.ec_slab.alloc(&state.pa).expect("boot allocation must succeed") as *mut kobj::Ec;
    unsafe {
        ec_ptr.write(kobj::Ec {
            header: Header::new(Kind::Ec, 0),
            cpu: 0,
            event_base: 0,
            state: kobj::EcState::Running,
            partner: None,
            reverse_cap: None,
            helpers: None,
            sm_wait_next: None,
        });
    }
    let ec_cap = Capability::new(ec_ptr as *const (), 0b1);
    state
        .objspace
        .insert(SEL_EC_ROOT, ec_cap, &state.pa)
        .expect("selector SEL_EC_ROOT is free at boot");

    let sc_ptr = state.sc_slab.alloc(&state.pa).expect("boot allocation must succeed") as *mut kobj::Sc;
    unsafe {
        sc_ptr.write(kobj::Sc {
            header: Header::new(Kind::Sc, 0),
            priority: sched::DEFAULT_PRIO,
            budget: sched::DEFAULT_QUANTUM,
            remaining: sched::DEFAULT_QUANTUM,
            owner: ec_ptr,
            cpu: 0,
            link_prev: None,
            link_next: None,
        });
    }
    let sc_cap = Capability::new(sc_ptr as *const (), 0b1);
    state
        .objspace
        .insert(SEL_SC_ROOT, sc_cap, &state.pa)
        .expect("selector SEL_SC_ROOT is free at boot");
    let sc = NonNull::new(sc_ptr).expect("just allocated");
    state.runqueue.enqueue(sc);

    for i in 0..gsi_count {
        let sm_ptr = state.sm_slab.alloc(&state.pa).expect("boot allocation must succeed") as *mut kobj::Sm;
        unsafe { sm_ptr.write(kobj::Sm { header: Header::new(Kind::Sm, 0), counter: 0, waiters: None }) };
        let sm_cap = Capability::new(sm_ptr as *const (), 0b1);
        let sel = SEL_GSI_BASE + i as u64;
        state
            .objspace
            .insert(sel, sm_cap, &state.pa)
            .expect("boot GSI selectors are free");
        state.gsis.assign(i as u8, sm_ptr, 0);
    }

    RootTask { ec: ec_ptr, sc, gsi_count }
}
