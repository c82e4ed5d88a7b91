/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Per-CPU hazard word. Every kernel exit path ORs outstanding work into this
//! word instead of running it inline, and drains it right before the final
//! return to user; `Hazards::service` is that drain point.

use core::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hazard: u32 {
        /// Run the scheduler before returning to user.
        const SCHED  = 1 << 0;
        /// Run an RCU grace-period tick.
        const RCU    = 1 << 1;
        /// Switch the FPU owner.
        const FPU    = 1 << 2;
        /// Deliver an asynchronous wake to the current EC.
        const RECALL = 1 << 3;
        /// Reload data/extra segment descriptors.
        const DS_ES  = 1 << 4;
        /// Reload the task register.
        const TR     = 1 << 5;
        /// Re-apply the guest TSC offset.
        const TSC    = 1 << 6;
    }
}

/// One word per CPU; set bits are handled (and cleared) on the next kernel
/// exit, each handler running to completion before the next is checked.
#[derive(Default)]
pub struct Hazards(AtomicU32);

impl Hazards {
    pub const fn new() -> Self {
        Hazards(AtomicU32::new(0))
    }

    pub fn raise(&self, h: Hazard) {
        self.0.fetch_or(h.bits(), Ordering::AcqRel);
    }

    pub fn clear(&self, h: Hazard) {
        self.0.fetch_and(!h.bits(), Ordering::AcqRel);
    }

    pub fn pending(&self) -> Hazard {
        Hazard::from_bits_truncate(self.0.load(Ordering::Acquire))
    }

    /// Runs `handler` for every set bit (in ascending bit order), clearing
    /// each bit only after its handler returns, then re-reads the word so a
    /// handler that raises a different hazard is still serviced before
    /// returning to user.
    pub fn service(&self, mut handler: impl FnMut(Hazard)) {
        loop {
            let pending = self.pending();
            if pending.is_empty() {
                return;
            }
            for bit in pending.iter() {
                handler(bit);
                self.clear(bit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;
    use super::*;

    #[test]
    fn raise_then_clear_round_trips() {
        let h = Hazards::new();
        h.raise(Hazard::SCHED | Hazard::RCU);
        assert_eq!(h.pending(), Hazard::SCHED | Hazard::RCU);
        h.clear(Hazard::RCU);
        assert_eq!(h.pending(), Hazard::SCHED);
    }

    #[test]
    fn service_drains_every_bit_exactly_once() {
        let h = Hazards::new();
        h.raise(Hazard::SCHED | Hazard::FPU | Hazard::RECALL);
        let mut seen = alloc::vec::Vec::new();
        h.service(|bit| seen.push(bit));
        assert_eq!(seen.len(), 3);
        assert!(h.pending().is_empty());
    }

    #[test]
    fn a_handler_that_raises_a_fresh_hazard_is_still_serviced() {
        let h = Hazards::new();
        h.raise(Hazard::SCHED);
        let mut ran_rcu = false;
        h.service(|bit| {
            if bit == Hazard::SCHED && !ran_rcu {
                h.raise(Hazard::RCU);
            }
            if bit == Hazard::RCU {
                ran_rcu = true;
            }
        });
        assert!(ran_rcu);
        assert!(h.pending().is_empty());
    }
}
