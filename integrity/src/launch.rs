/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Measured-launch sequencing and the platform abstraction it runs against.
//!
//! The four-step boot sequence (locate + validate ACM, build the MLE
//! request, program MTRRs write-back, invoke secure-enter) is
//! architecture-generic; everything that actually touches hardware sits
//! behind [`LaunchPlatform`], grounded on
//! `examples/msft-jlange-svsm`'s `SvsmPlatform` trait — one `Send + Sync`
//! trait with a software/test fake (here: [`TestPlatform`]) and a real
//! ACM-backed implementation living in the `kernel` crate.

use crate::acm;
use crate::postlaunch::{AcmToMle, PreToAcm, PreToMle};
use snafu::Snafu;

/// Capability bits copied into the MLE header, matching `Acm::Cap`.
pub mod cap {
    pub const WAKEUP_GETSEC: u32 = 1 << 0;
    pub const MLE_PTAB_PTR: u32 = 1 << 2;
}

/// On-heap request describing the MLE, handed to `secure-enter`. Mirrors
/// `Txt::Data_os_sinit`'s `mle_ptab`/`mle_size`/`mle_header`/`pmr_*` fields.
pub struct MleRequest {
    pub page_table_root: u64,
    pub mle_size: u64,
    pub mle_header_caps: u32,
    pub pmr_base: u64,
    pub pmr_size: u64,
    pub event_log_phys: Option<u64>,
}

#[derive(Snafu, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchError {
    #[snafu(display("no ACM region found on this platform"))]
    AcmNotFound,
    #[snafu(display("ACM failed validation: {cause}"))]
    InvalidAcm { cause: acm::AcmError },
    #[snafu(display("could not program MTRRs write-back over the ACM region"))]
    MtrrProgramming,
    #[snafu(display("secure-enter instruction did not hand control to the MLE entry point"))]
    SecureEnterFailed,
}

/// Everything the generic measured-launch sequence needs from the
/// concrete platform. A real implementation drives TXT/SINIT registers and
/// GETSEC leaves; [`TestPlatform`] fakes all of it for host-side tests.
pub trait LaunchPlatform: Send + Sync {
    /// Physical base/size of the platform-provided ACM region, plus its
    /// parsed header and info table.
    fn locate_acm(&self) -> Option<(acm::Header, acm::Info)>;

    fn chipset_didvid(&self) -> u64;
    fn cpu_fms(&self) -> u32;
    fn cpu_pid(&self) -> u64;
    fn expected_acm_uuid(&self) -> [u8; 16];

    /// Programs MTRRs so the ACM region (and the MLE image behind it) are
    /// mapped write-back, per spec step 3.
    fn program_mtrrs_write_back(&mut self, base: u64, size: u64) -> Result<(), LaunchError>;

    /// Invokes the platform's secure-enter instruction. On success control
    /// resumes inside the locked-down MLE and this returns `Ok`; the
    /// caller is responsible for restoring cached tables/MTRRs from
    /// `request` afterwards.
    fn secure_enter(&mut self, request: &MleRequest) -> Result<(), LaunchError>;

    /// Post-launch data the platform exposes once inside the MLE.
    fn pre_to_mle(&self) -> PreToMle;
    fn pre_to_acm(&self) -> PreToAcm;
    fn acm_to_mle(&self) -> AcmToMle;
}

/// Runs the full pre-launch sequence from spec §4.J: locate + validate the
/// ACM, build the MLE request, program MTRRs, invoke secure-enter.
pub fn sequence(platform: &mut dyn LaunchPlatform, mle_image_base: u64, mle_image_size: u64, page_table_root: u64, event_log_phys: Option<u64>) -> Result<(), LaunchError> {
    let (header, info) = platform.locate_acm().ok_or(LaunchError::AcmNotFound)?;

    unsafe {
        acm::validate(
            &header,
            &info,
            &platform.expected_acm_uuid(),
            platform.chipset_didvid(),
            platform.cpu_fms(),
            platform.cpu_pid(),
        )
    }
    .map_err(|cause| LaunchError::InvalidAcm { cause })?;

    let request = MleRequest {
        page_table_root,
        mle_size: mle_image_size,
        mle_header_caps: cap::MLE_PTAB_PTR,
        pmr_base: mle_image_base,
        pmr_size: mle_image_size,
        event_log_phys,
    };

    platform.program_mtrrs_write_back(mle_image_base, mle_image_size).map_err(|_| LaunchError::MtrrProgramming)?;

    platform.secure_enter(&request).map_err(|_| LaunchError::SecureEnterFailed)
}

#[cfg(test)]
pub struct TestPlatform {
    pub header: acm::Header,
    pub info: acm::Info,
    pub uuid: [u8; 16],
    pub mtrr_calls: u32,
    pub secure_enter_calls: u32,
    pub fail_secure_enter: bool,
}

#[cfg(test)]
impl TestPlatform {
    pub fn well_formed(uuid: [u8; 16]) -> Self {
        TestPlatform {
            header: acm::Header {
                kind: acm::TYPE_CHIPSET,
                subtype: acm::SUBTYPE_SINIT,
                header_size: 0,
                header_version: 0,
                chipset: 0,
                flags: 0,
                vendor: 0,
                date: 0,
                total_size: 0,
                txt_svn: 0,
                sgx_svn: 0,
                code_ctrl: 0,
                error_entry: 0,
                gdt_limit: 0,
                gdt_base: 0,
                sel: 0,
                eip: 0,
                reserved2: [0; 8],
                key_size: acm::KEY_SIZE_RSA2048_DWORDS,
                scratch_size: 64,
            },
            info: acm::Info {
                uuid,
                acm_type: 0,
                version: 1,
                length: 0,
                pch_list: 0,
                max_ver_pre_acm: 0,
                min_ver_mle_hdr: 0,
                capabilities: 0,
                acm_version: 0,
                acm_major: 0,
                acm_minor: 0,
                acm_build: 0,
                cpu_list: 0,
                tpm_list: 0,
            },
            uuid,
            mtrr_calls: 0,
            secure_enter_calls: 0,
            fail_secure_enter: false,
        }
    }
}

#[cfg(test)]
impl LaunchPlatform for TestPlatform {
    fn locate_acm(&self) -> Option<(acm::Header, acm::Info)> {
        Some((self.header, self.info))
    }

    fn chipset_didvid(&self) -> u64 {
        0
    }

    fn cpu_fms(&self) -> u32 {
        0
    }

    fn cpu_pid(&self) -> u64 {
        0
    }

    fn expected_acm_uuid(&self) -> [u8; 16] {
        self.uuid
    }

    fn program_mtrrs_write_back(&mut self, _base: u64, _size: u64) -> Result<(), LaunchError> {
        self.mtrr_calls += 1;
        Ok(())
    }

    fn secure_enter(&mut self, _request: &MleRequest) -> Result<(), LaunchError> {
        self.secure_enter_calls += 1;
        if self.fail_secure_enter {
            Err(LaunchError::SecureEnterFailed)
        } else {
            Ok(())
        }
    }

    fn pre_to_mle(&self) -> PreToMle {
        PreToMle { mtrr_def_type: 0, misc_enable: 0, debugctl: 0 }
    }

    fn pre_to_acm(&self) -> PreToAcm {
        PreToAcm { mle_ptab: 0, mle_size: 0, pmr_lo_base: 0, pmr_lo_size: 0, pmr_hi_base: 0, pmr_hi_size: 0 }
    }

    fn acm_to_mle(&self) -> AcmToMle {
        AcmToMle { rlp_wakeup: 0, madt: None, mcfg: None, dmar: None, cedt: None }
    }
}
