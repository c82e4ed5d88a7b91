/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Trap entry is an architecture-specific assembly stub, not Rust: it saves
//! a fixed register image to the per-CPU kernel stack, dispatches by vector,
//! and restores the image on the way out. This module only fixes the two
//! things the rest of the core actually needs from that contract: the
//! register-image layout itself, and the function-pointer shape a vector
//! dispatches to. The stub's assembly lives outside this crate entirely.

/// General-purpose half of the image every trap saves, in `pusha`-adjacent
/// order; this is what a syscall-leaf handler reads its arguments from and
/// what `REPLY`/`CALL` copy into under the portal's MTD mask.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SysRegs {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
}

/// Full exception-time image: [`SysRegs`] plus the vector/error-code pair
/// the stub pushed and the hardware `iret` frame it must eventually consume.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcRegs {
    pub sys: SysRegs,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl ExcRegs {
    /// Copies the MTD-selected words of `self` into `dst`, mirroring the
    /// portal's mtd_mask bit-for-field convention: bit `i` selects the
    /// `i`-th `u64` of [`SysRegs`] (rax is bit 0, rbx bit 1, and so on).
    pub fn copy_masked(&self, dst: &mut SysRegs, mtd: u64) {
        let src = as_words(&self.sys);
        let out = as_words_mut(dst);
        for i in 0..src.len() {
            if mtd & (1 << i) != 0 {
                out[i] = src[i];
            }
        }
    }
}

fn as_words(regs: &SysRegs) -> &[u64; 15] {
    unsafe { &*(regs as *const SysRegs as *const [u64; 15]) }
}

fn as_words_mut(regs: &mut SysRegs) -> &mut [u64; 15] {
    unsafe { &mut *(regs as *mut SysRegs as *mut [u64; 15]) }
}

/// Shape of the C-level handler a vector dispatches to. The assembly stub
/// guarantees `ExcRegs` is fully populated and writable in place before the
/// call, and restores it verbatim after the handler returns.
pub type ExcHandler = extern "C" fn(&mut ExcRegs);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_bit_zero_copies_only_rax() {
        let mut exc = ExcRegs::default();
        exc.sys.rax = 0xaa;
        exc.sys.rbx = 0xbb;
        let mut dst = SysRegs::default();
        exc.copy_masked(&mut dst, 0b1);
        assert_eq!(dst.rax, 0xaa);
        assert_eq!(dst.rbx, 0);
    }

    #[test]
    fn mask_all_bits_copies_every_word() {
        let mut exc = ExcRegs::default();
        exc.sys.rax = 1;
        exc.sys.r15 = 15;
        let mut dst = SysRegs::default();
        exc.copy_masked(&mut dst, u64::MAX);
        assert_eq!(dst.rax, 1);
        assert_eq!(dst.r15, 15);
    }

    #[test]
    fn zero_mask_copies_nothing() {
        let mut exc = ExcRegs::default();
        exc.sys.rax = 0xaa;
        let mut dst = SysRegs::default();
        dst.rax = 0xff;
        exc.copy_masked(&mut dst, 0);
        assert_eq!(dst.rax, 0xff);
    }
}
