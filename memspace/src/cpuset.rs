/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Fixed-size CPU bitmap, matching the original's `Cpuset`: one bit per CPU,
//! used by [`crate::mem::HstSpace`] to track which CPUs have this space
//! loaded and which still owe it a TLB shoot-down.

use core::sync::atomic::{AtomicU64, Ordering};

/// Supports up to 64 CPUs, the width of one machine word.
#[derive(Debug, Default)]
pub struct CpuSet(AtomicU64);

impl CpuSet {
    pub const fn new() -> Self {
        CpuSet(AtomicU64::new(0))
    }

    #[inline]
    pub fn chk(&self, cpu: u32) -> bool {
        self.0.load(Ordering::Relaxed) & (1 << cpu) != 0
    }

    /// Sets `cpu`'s bit and reports whether it was already set.
    #[inline]
    pub fn set(&self, cpu: u32) -> bool {
        self.0.fetch_or(1 << cpu, Ordering::AcqRel) & (1 << cpu) != 0
    }

    #[inline]
    pub fn clr(&self, cpu: u32) {
        self.0.fetch_and(!(1 << cpu), Ordering::AcqRel);
    }

    #[inline]
    pub fn merge(&self, other: &CpuSet) {
        self.0
            .fetch_or(other.0.load(Ordering::Relaxed), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_reports_prior_state() {
        let s = CpuSet::new();
        assert!(!s.set(3));
        assert!(s.chk(3));
        assert!(s.set(3));
    }

    #[test]
    fn clr_removes_only_the_targeted_cpu() {
        let s = CpuSet::new();
        s.set(1);
        s.set(2);
        s.clr(1);
        assert!(!s.chk(1));
        assert!(s.chk(2));
    }

    #[test]
    fn merge_unions_bits() {
        let a = CpuSet::new();
        let b = CpuSet::new();
        a.set(0);
        b.set(5);
        a.merge(&b);
        assert!(a.chk(0));
        assert!(a.chk(5));
    }
}
