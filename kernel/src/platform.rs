/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! The `integrity::launch::LaunchPlatform` this tree actually ships: one
//! that truthfully reports no ACM region, so `measured-launch` builds run
//! the sequence and fail closed with [`LaunchError::AcmNotFound`] instead
//! of touching GETSEC/TXT registers this tree has no driver for. A real
//! platform (TXT register access, GETSEC leaves) is a per-board
//! collaborator not implemented here.

use integrity::acm;
use integrity::launch::{LaunchError, LaunchPlatform, MleRequest};
use integrity::postlaunch::{AcmToMle, PreToAcm, PreToMle};

pub struct NullLaunchPlatform;

impl LaunchPlatform for NullLaunchPlatform {
    fn locate_acm(&self) -> Option<(acm::Header, acm::Info)> {
        None
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
        [0; 16]
    }

    fn program_mtrrs_write_back(&mut self, _base: u64, _size: u64) -> Result<(), LaunchError> {
        Err(LaunchError::MtrrProgramming)
    }

    fn secure_enter(&mut self, _request: &MleRequest) -> Result<(), LaunchError> {
        Err(LaunchError::SecureEnterFailed)
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_no_acm_region_so_sequence_fails_closed() {
        let mut platform = NullLaunchPlatform;
        let err = integrity::launch::sequence(&mut platform, 0, 0, 0, None).unwrap_err();
        assert_eq!(err, LaunchError::AcmNotFound);
    }
}
