/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Authenticated Code Module (ACM) header validation: type/subtype/size
//! match, info UUID match, and chipset/CPU family-model-stepping id-list
//! walks, mirroring `inc/x86_64/acm.hpp`'s `Header`/`Info`/`Id_pch`/`Id_cpu`.

use snafu::Snafu;
use static_assertions::const_assert_eq;

pub const TYPE_CHIPSET: u16 = 2;
pub const SUBTYPE_SINIT: u16 = 0;
pub const SUBTYPE_STARTUP: u16 = 1;
pub const SUBTYPE_BOOTGUARD: u16 = 3;

/// RSA-2048 and RSA-3072 key material sizes, counted in dwords, as the
/// original's SINIT ACMs ship.
pub const KEY_SIZE_RSA2048_DWORDS: u32 = 64;
pub const KEY_SIZE_RSA3072_DWORDS: u32 = 96;
const SCRATCH_SIZE_MAX_DWORDS: u32 = 832;

/// Fixed 128-byte ACM header, matching `Acm::Header` field order exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub kind: u16,
    pub subtype: u16,
    pub header_size: u32,
    pub header_version: u32,
    pub chipset: u16,
    pub flags: u16,
    pub vendor: u32,
    pub date: u32,
    pub total_size: u32,
    pub txt_svn: u16,
    pub sgx_svn: u16,
    pub code_ctrl: u32,
    pub error_entry: u32,
    pub gdt_limit: u32,
    pub gdt_base: u32,
    pub sel: u32,
    pub eip: u32,
    pub reserved2: [u64; 8],
    pub key_size: u32,
    pub scratch_size: u32,
}

const_assert_eq!(core::mem::size_of::<Header>(), 128);

/// 48-byte ACM Information Table, matching `Acm::Info`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Info {
    pub uuid: [u8; 16],
    pub acm_type: u8,
    pub version: u8,
    pub length: u16,
    pub pch_list: u32,
    pub max_ver_pre_acm: u32,
    pub min_ver_mle_hdr: u32,
    pub capabilities: u32,
    pub acm_version: u8,
    pub acm_major: u8,
    pub acm_minor: u8,
    pub acm_build: u8,
    pub cpu_list: u32,
    pub tpm_list: u32,
}

const_assert_eq!(core::mem::size_of::<Info>(), 48);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct List {
    pub count: u32,
}

/// One PCH (vendor, device, revision) match entry.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IdPch {
    pub flags: u32,
    pub vid: u16,
    pub did: u16,
    pub rid: u16,
    pub reserved: [u16; 3],
}

const_assert_eq!(core::mem::size_of::<IdPch>(), 16);

impl IdPch {
    fn matches(&self, didvid: u64) -> bool {
        let v = didvid as u16;
        let d = (didvid >> 16) as u16;
        let r = (didvid >> 32) as u16;
        self.vid == v && self.did == d && if self.flags & 1 != 0 { self.rid & r != 0 } else { self.rid == r }
    }
}

/// One CPU family/model/stepping match entry.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct IdCpu {
    pub fms: u32,
    pub fms_mask: u32,
    pub pid: u64,
    pub pid_mask: u64,
}

const_assert_eq!(core::mem::size_of::<IdCpu>(), 24);

impl IdCpu {
    fn matches(&self, fms: u32, pid: u64) -> bool {
        self.fms == (self.fms_mask & fms) && self.pid == (self.pid_mask & pid)
    }
}

#[derive(Snafu, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmError {
    #[snafu(display("ACM header type is not chipset SINIT"))]
    BadType,
    #[snafu(display("ACM header subtype is unrecognized"))]
    BadSubtype,
    #[snafu(display("ACM key size outside the RSA-2048/RSA-3072 set"))]
    BadKeySize,
    #[snafu(display("ACM scratch size exceeds the platform maximum"))]
    BadScratchSize,
    #[snafu(display("ACM info UUID does not match the expected module UUID"))]
    BadUuid,
    #[snafu(display("chipset id list does not contain this platform's vendor/device/revision"))]
    UnsupportedChipset,
    #[snafu(display("CPU id list does not contain this CPU's family/model/stepping"))]
    UnsupportedCpu,
}

impl Header {
    /// # Safety
    /// `self` must sit at byte offset 0 of the full ACM module image;
    /// `info.pch_list`/`info.cpu_list` are offsets relative to that same
    /// base, matching the original's `reinterpret_cast<uintptr_t>(this) +
    /// list_offset` arithmetic.
    pub unsafe fn pch_list<'a>(&'a self, info: &Info) -> Option<&'a [IdPch]> {
        if info.version < 2 {
            return None;
        }
        let base = self as *const Header as *const u8;
        let list_ptr = unsafe { base.add(info.pch_list as usize) };
        let list = unsafe { &*(list_ptr as *const List) };
        let items_ptr = unsafe { list_ptr.add(core::mem::size_of::<List>()) } as *const IdPch;
        Some(unsafe { core::slice::from_raw_parts(items_ptr, list.count as usize) })
    }

    /// # Safety
    /// Same contract as [`Header::pch_list`].
    pub unsafe fn cpu_list<'a>(&'a self, info: &Info) -> Option<&'a [IdCpu]> {
        if info.version < 4 {
            return None;
        }
        let base = self as *const Header as *const u8;
        let list_ptr = unsafe { base.add(info.cpu_list as usize) };
        let list = unsafe { &*(list_ptr as *const List) };
        let items_ptr = unsafe { list_ptr.add(core::mem::size_of::<List>()) } as *const IdCpu;
        Some(unsafe { core::slice::from_raw_parts(items_ptr, list.count as usize) })
    }
}

/// Validates an ACM before it is handed to `secure-enter`: type/subtype,
/// key/scratch size bounds, info UUID, and (when the id lists are present)
/// that this platform's chipset and CPU are on the module's supported lists.
///
/// # Safety
/// `header`/`info` must describe a single in-memory ACM image; the id-list
/// walk dereferences offsets recorded inside that same image.
pub unsafe fn validate(
    header: &Header,
    info: &Info,
    expected_uuid: &[u8; 16],
    chipset_didvid: u64,
    cpu_fms: u32,
    cpu_pid: u64,
) -> Result<(), AcmError> {
    if header.kind != TYPE_CHIPSET {
        return Err(AcmError::BadType);
    }
    if ![SUBTYPE_SINIT, SUBTYPE_STARTUP, SUBTYPE_BOOTGUARD].contains(&header.subtype) {
        return Err(AcmError::BadSubtype);
    }
    if header.key_size != KEY_SIZE_RSA2048_DWORDS && header.key_size != KEY_SIZE_RSA3072_DWORDS {
        return Err(AcmError::BadKeySize);
    }
    if header.scratch_size > SCRATCH_SIZE_MAX_DWORDS {
        return Err(AcmError::BadScratchSize);
    }
    if &info.uuid != expected_uuid {
        return Err(AcmError::BadUuid);
    }
    if let Some(pch) = unsafe { header.pch_list(info) } {
        if !pch.is_empty() && !pch.iter().any(|e| e.matches(chipset_didvid)) {
            return Err(AcmError::UnsupportedChipset);
        }
    }
    if let Some(cpu) = unsafe { header.cpu_list(info) } {
        if !cpu.is_empty() && !cpu.iter().any(|e| e.matches(cpu_fms, cpu_pid)) {
            return Err(AcmError::UnsupportedCpu);
        }
    }
    Ok(())
}
