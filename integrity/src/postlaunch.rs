/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Post-launch data the platform exposes once inside the MLE: the four
//! heaps from `inc/x86_64/txt.hpp`'s `Data_bios`/`Data_os_mle`/
//! `Data_os_sinit`/`Data_sinit_mle`, trimmed to the fields this core
//! actually reads. The kernel trusts these validated copies in preference
//! to firmware-provided ones, per spec §4.J.

/// EFI-to-PRE data: platform shape as the pre-launch environment saw it.
#[derive(Debug, Clone, Copy)]
pub struct EfiToPre {
    pub num_cpu: u32,
    pub platform_class: u32,
}

/// PRE-MLE data: state saved before `secure-enter` so it can be restored
/// once the CPU is locked down inside the MLE.
#[derive(Debug, Clone, Copy)]
pub struct PreToMle {
    pub mtrr_def_type: u64,
    pub misc_enable: u64,
    pub debugctl: u64,
}

/// PRE-ACM data: the MLE/ACM capabilities and protected-memory-region
/// extents the ACM validated before entering the MLE.
#[derive(Debug, Clone, Copy)]
pub struct PreToAcm {
    pub mle_ptab: u64,
    pub mle_size: u64,
    pub pmr_lo_base: u64,
    pub pmr_lo_size: u64,
    pub pmr_hi_base: u64,
    pub pmr_hi_size: u64,
}

/// ACM-MLE data: validated copies of select ACPI tables plus the
/// RLP-wakeup pointer, all produced by the ACM rather than trusted
/// firmware.
#[derive(Debug, Clone, Copy)]
pub struct AcmToMle {
    pub rlp_wakeup: u32,
    pub madt: Option<core::ptr::NonNull<u8>>,
    pub mcfg: Option<core::ptr::NonNull<u8>>,
    pub dmar: Option<core::ptr::NonNull<u8>>,
    pub cedt: Option<core::ptr::NonNull<u8>>,
}

unsafe impl Send for AcmToMle {}
