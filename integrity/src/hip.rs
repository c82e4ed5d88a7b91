/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Hypervisor Information Page (HIP) builder: the root task's read-only
//! view of boot-time facts, matching `inc/x86_64/hip.hpp`'s field order for
//! the architecture-independent header, with an x86_64 trailer carrying
//! the event log's physical address/size/offset (`inc/x86_64/tpm_log.hpp`'s
//! `phys`/`size`/`offs` statics, rather than `hip_arch.hpp`'s plain
//! begin/end pair, since the HIP needs to publish the log without making
//! the root task re-walk it).

use bitflags::bitflags;
use static_assertions::const_assert_eq;

const SIGNATURE: u32 = 0x4156_4f4e; // "NOVA", little-endian

bitflags! {
    /// Feature bits, matching `Hip_arch::Feature`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u64 {
        const IOMMU = 1 << 0;
        const VMX   = 1 << 1;
        const SVM   = 1 << 2;
    }
}

/// Fixed-offset, architecture-independent header, matching `Hip`'s field
/// order up to (not including) the `Hip_arch arch` member.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub signature: u32,
    pub checksum: u16,
    pub length: u16,
    pub nova_p_addr: u64,
    pub nova_e_addr: u64,
    pub mbuf_p_addr: u64,
    pub mbuf_e_addr: u64,
    pub root_p_addr: u64,
    pub root_e_addr: u64,
    pub acpi_rsdp_addr: u64,
    pub uefi_mmap_addr: u64,
    pub uefi_mmap_size: u32,
    pub uefi_desc_size: u16,
    pub uefi_desc_vers: u16,
    pub tmr_frq: u64,
    pub sel_num: u64,
    pub sel_hst_arch: u16,
    pub sel_hst_nova: u16,
    pub sel_gst_arch: u16,
    pub sel_gst_nova: u16,
    pub cpu_num: u16,
    pub cpu_bsp: u16,
    pub int_pin: u16,
    pub int_msi: u16,
    pub mco_obj: u8,
    pub mco_hst: u8,
    pub mco_gst: u8,
    pub mco_dma: u8,
    pub mco_pio: u8,
    pub mco_msr: u8,
    pub kimax: u16,
    pub features: u64,
}

const_assert_eq!(core::mem::size_of::<Header>(), 0x80);

/// x86_64 architecture-specific trailer: event-log location, grounded on
/// `Tpm_log`'s `phys`/`size`/`offs` statics rather than `Hip_arch`'s plain
/// `elog_p_addr`/`elog_e_addr` pair.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ArchTrailer {
    pub event_log_phys: u64,
    pub event_log_size: u32,
    pub event_log_offset: u32,
}

/// The finished, checksummed HIP.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Hip {
    header: Header,
    arch: ArchTrailer,
}

impl From<hal::Features> for Features {
    fn from(f: hal::Features) -> Self {
        let mut bits = Features::empty();
        bits.set(Features::VMX, f.vmx);
        bits.set(Features::SVM, f.svm);
        bits.set(Features::IOMMU, f.iommu);
        bits
    }
}

impl Hip {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn arch(&self) -> &ArchTrailer {
        &self.arch
    }

    pub fn feature(&self, f: Features) -> bool {
        Features::from_bits_truncate(self.header.features).contains(f)
    }
}

fn words(hip: &Hip) -> impl Iterator<Item = u16> + '_ {
    let bytes = unsafe { core::slice::from_raw_parts((hip as *const Hip).cast::<u8>(), core::mem::size_of::<Hip>()) };
    bytes.chunks_exact(2).map(|c| u16::from_ne_bytes([c[0], c[1]]))
}

/// Builds a [`Hip`] field by field, the way the original's boot code fills
/// in a statically-allocated `Hip` one member at a time.
#[derive(Default)]
pub struct HipBuilder {
    header: Header,
    arch: ArchTrailer,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            signature: SIGNATURE,
            checksum: 0,
            length: (core::mem::size_of::<Header>() + core::mem::size_of::<ArchTrailer>()) as u16,
            nova_p_addr: 0,
            nova_e_addr: 0,
            mbuf_p_addr: 0,
            mbuf_e_addr: 0,
            root_p_addr: 0,
            root_e_addr: 0,
            acpi_rsdp_addr: 0,
            uefi_mmap_addr: 0,
            uefi_mmap_size: 0,
            uefi_desc_size: 0,
            uefi_desc_vers: 0,
            tmr_frq: 0,
            sel_num: 0,
            sel_hst_arch: 0,
            sel_hst_nova: 0,
            sel_gst_arch: 0,
            sel_gst_nova: 0,
            cpu_num: 0,
            cpu_bsp: 0,
            int_pin: 0,
            int_msi: 0,
            mco_obj: 0,
            mco_hst: 0,
            mco_gst: 0,
            mco_dma: 0,
            mco_pio: 0,
            mco_msr: 0,
            kimax: 0,
            features: 0,
        }
    }
}

impl Default for ArchTrailer {
    fn default() -> Self {
        ArchTrailer { event_log_phys: 0, event_log_size: 0, event_log_offset: 0 }
    }
}

impl HipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernel_image(mut self, p_addr: u64, e_addr: u64) -> Self {
        self.header.nova_p_addr = p_addr;
        self.header.nova_e_addr = e_addr;
        self
    }

    pub fn mhv_buffer(mut self, p_addr: u64, e_addr: u64) -> Self {
        self.header.mbuf_p_addr = p_addr;
        self.header.mbuf_e_addr = e_addr;
        self
    }

    pub fn root_image(mut self, p_addr: u64, e_addr: u64) -> Self {
        self.header.root_p_addr = p_addr;
        self.header.root_e_addr = e_addr;
        self
    }

    pub fn acpi_rsdp(mut self, addr: u64) -> Self {
        self.header.acpi_rsdp_addr = addr;
        self
    }

    pub fn uefi_mmap(mut self, addr: u64, size: u32, desc_size: u16, desc_vers: u16) -> Self {
        self.header.uefi_mmap_addr = addr;
        self.header.uefi_mmap_size = size;
        self.header.uefi_desc_size = desc_size;
        self.header.uefi_desc_vers = desc_vers;
        self
    }

    pub fn timer_frequency(mut self, freq: u64) -> Self {
        self.header.tmr_frq = freq;
        self
    }

    pub fn cpu_topology(mut self, cpu_num: u16, cpu_bsp: u16) -> Self {
        self.header.cpu_num = cpu_num;
        self.header.cpu_bsp = cpu_bsp;
        self
    }

    pub fn interrupts(mut self, int_pin: u16, int_msi: u16) -> Self {
        self.header.int_pin = int_pin;
        self.header.int_msi = int_msi;
        self
    }

    /// Root selectors pre-installed per `Space_obj::insert_root` (console,
    /// root OBJ/HST/PIO, PD self, per-CPU bound EC, one SM per GSI).
    pub fn root_selectors(mut self, hst_arch: u16, hst_nova: u16, gst_arch: u16, gst_nova: u16, sel_num: u64) -> Self {
        self.header.sel_hst_arch = hst_arch;
        self.header.sel_hst_nova = hst_nova;
        self.header.sel_gst_arch = gst_arch;
        self.header.sel_gst_nova = gst_nova;
        self.header.sel_num = sel_num;
        self
    }

    /// Max slab object counts per kind, matching `mco_*`.
    pub fn max_object_counts(mut self, obj: u8, hst: u8, gst: u8, dma: u8, pio: u8, msr: u8) -> Self {
        self.header.mco_obj = obj;
        self.header.mco_hst = hst;
        self.header.mco_gst = gst;
        self.header.mco_dma = dma;
        self.header.mco_pio = pio;
        self.header.mco_msr = msr;
        self
    }

    pub fn features(mut self, features: Features) -> Self {
        self.header.features = features.bits();
        self
    }

    /// Convenience over [`HipBuilder::features`] for the common case of
    /// composing the bitmap straight from [`hal::Features`]' detected
    /// VMX/SVM bits plus a platform-supplied IOMMU bit.
    pub fn cpu_features(self, features: hal::Features) -> Self {
        self.features(Features::from(features))
    }

    pub fn event_log(mut self, phys: u64, size: u32, offset: u32) -> Self {
        self.arch.event_log_phys = phys;
        self.arch.event_log_size = size;
        self.arch.event_log_offset = offset;
        self
    }

    /// Finalizes the page: fills in the checksum so the 16-bit words of
    /// the whole structure sum to zero, the way firmware tables (and the
    /// original's `Hip::build`) self-check.
    pub fn build(mut self) -> Hip {
        self.header.checksum = 0;
        let mut hip = Hip { header: self.header, arch: self.arch };
        let sum: u32 = words(&hip).map(|w| w as u32).sum();
        hip.header.checksum = (0u32.wrapping_sub(sum) & 0xffff) as u16;
        hip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_produces_a_checksum_that_sums_every_word_to_zero() {
        let hip = HipBuilder::new()
            .kernel_image(0x10_0000, 0x20_0000)
            .cpu_topology(4, 0)
            .features(Features::VMX | Features::IOMMU)
            .event_log(0x30_0000, 0x1000, 0x40)
            .build();
        let sum: u32 = words(&hip).map(|w| w as u32).sum();
        assert_eq!(sum & 0xffff, 0);
    }

    #[test]
    fn feature_reports_only_bits_that_were_set() {
        let hip = HipBuilder::new().features(Features::VMX).build();
        assert!(hip.feature(Features::VMX));
        assert!(!hip.feature(Features::SVM));
    }

    #[test]
    fn signature_is_always_nova() {
        let hip = HipBuilder::new().build();
        assert_eq!(hip.header().signature, SIGNATURE);
    }

    #[test]
    fn cpu_features_carries_detected_vmx_and_svm_into_the_bitmap() {
        let hip = HipBuilder::new()
            .cpu_features(hal::Features { vmx: true, svm: false, iommu: true })
            .build();
        assert!(hip.feature(Features::VMX));
        assert!(!hip.feature(Features::SVM));
        assert!(hip.feature(Features::IOMMU));
    }
}
