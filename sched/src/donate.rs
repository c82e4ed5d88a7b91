/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Donation queue: SCs that arrive for an EC blocked in `WAIT_REPLY` are
//! parked here instead of their own runqueue, so their owner EC runs the
//! blocked EC's work instead (priority-inheritance-like donation for short
//! critical sections). [`attach`] is LIFO — the most recently donated SC
//! is the one whose priority matters for the immediate unblock, and on
//! unblock every donor is re-enqueued regardless of order.

use core::ptr::NonNull;
use kobj::{Ec, Sc};

/// Parks `sc` on `ec`'s helper list. `sc` must not currently be linked into
/// any runqueue or helper list.
pub fn attach(ec: &mut Ec, sc: NonNull<Sc>) {
    unsafe { (*sc.as_ptr()).link_next = ec.helpers };
    ec.helpers = Some(sc.as_ptr());
}

/// Drains `ec`'s entire helper list, yielding each donor SC so the caller
/// can re-enqueue it on its home CPU's runqueue.
pub fn drain(ec: &mut Ec) -> Helpers {
    let head = ec.helpers.take().and_then(NonNull::new);
    Helpers { head }
}

pub struct Helpers {
    head: Option<NonNull<Sc>>,
}

impl Iterator for Helpers {
    type Item = NonNull<Sc>;

    fn next(&mut self) -> Option<NonNull<Sc>> {
        let sc = self.head?;
        self.head = unsafe { (*sc.as_ptr()).link_next }.and_then(NonNull::new);
        unsafe { (*sc.as_ptr()).link_next = None };
        Some(sc)
    }
}
