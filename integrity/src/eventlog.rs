/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Crypto-agile TPM event log: a linear append-only buffer starting with a
//! `"Spec ID Event03"` header entry, matching `inc/x86_64/tpm_log.hpp`'s
//! `Tpm_log::Header`/`Algorithm` layout and `extend` contract. Carries only
//! the hashing and log-append behaviour the original names (no TPM wire
//! protocol, per spec's Non-goals); actual PCR extension is delegated to
//! whatever [`Pcrs`] implementation the platform plugs in.

use bitflags::bitflags;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use static_assertions::const_assert_eq;

bitflags! {
    /// TCG Algorithm Registry bitmap, matching `Hash_bmp::Type`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HashAlgorithms: u32 {
        const SHA1     = 1 << 0;
        const SHA2_256 = 1 << 1;
        const SHA2_384 = 1 << 2;
        const SHA2_512 = 1 << 3;
    }
}

/// TCG Algorithm Registry identifiers, matching `Tcg::Tpm_alg::Type`.
pub const ALG_SHA1: u16 = 0x0004;
pub const ALG_SHA256: u16 = 0x000b;
pub const ALG_SHA384: u16 = 0x000c;
pub const ALG_SHA512: u16 = 0x000d;

const EV_NO_ACTION: u32 = 0x3;
const SPEC_ID_EVENT03: [u8; 16] = *b"Spec ID Event03\0";

/// 60-byte header entry, matching `Tpm_log::Header`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct Header {
    pcr: u32,
    event_type: u32,
    digest: [u8; 20],
    event_size: u32,
    signature: [u8; 16],
    class: u32,
    spec_version_minor: u8,
    spec_version_major: u8,
    spec_errata: u8,
    uintn_size: u8,
    algorithm_count: u32,
}

const_assert_eq!(core::mem::size_of::<Header>(), 60);

/// One algorithm-id/digest-size pair inside the header's algorithm table,
/// matching `Tpm_log::Algorithm`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct AlgorithmEntry {
    alg: u16,
    digest_size: u16,
}

const_assert_eq!(core::mem::size_of::<AlgorithmEntry>(), 4);

/// All four digests of one measured event, computed up front so `extend`
/// only has to pick which ones the TPM actually wants.
pub struct Digests {
    pub sha1: [u8; 20],
    pub sha2_256: [u8; 32],
    pub sha2_384: [u8; 48],
    pub sha2_512: [u8; 64],
}

impl Digests {
    pub fn compute(data: &[u8]) -> Self {
        Digests {
            sha1: Sha1::digest(data).into(),
            sha2_256: Sha256::digest(data).into(),
            sha2_384: Sha384::digest(data).into(),
            sha2_512: Sha512::digest(data).into(),
        }
    }
}

/// What a concrete TPM backend must provide: which algorithms are active,
/// and atomic per-algorithm PCR extension. The event log never speaks the
/// TPM wire protocol itself, only this.
pub trait Pcrs {
    fn active_algorithms(&self) -> HashAlgorithms;
    fn extend_sha1(&mut self, pcr: u32, digest: &[u8; 20]) -> bool;
    fn extend_sha2_256(&mut self, pcr: u32, digest: &[u8; 32]) -> bool;
    fn extend_sha2_384(&mut self, pcr: u32, digest: &[u8; 48]) -> bool;
    fn extend_sha2_512(&mut self, pcr: u32, digest: &[u8; 64]) -> bool;
}

fn alg_entry(alg: HashAlgorithms) -> (u16, u16) {
    if alg == HashAlgorithms::SHA1 {
        (ALG_SHA1, 20)
    } else if alg == HashAlgorithms::SHA2_256 {
        (ALG_SHA256, 32)
    } else if alg == HashAlgorithms::SHA2_384 {
        (ALG_SHA384, 48)
    } else if alg == HashAlgorithms::SHA2_512 {
        (ALG_SHA512, 64)
    } else {
        unreachable!("alg_entry called with a non-singleton flag")
    }
}

/// Appends bytes to `buf[*cursor..]`, returning `false` (without partial
/// writes beyond what already landed) if they would not fit.
fn append(buf: &mut [u8], cursor: &mut usize, bytes: &[u8]) -> bool {
    let end = match cursor.checked_add(bytes.len()) {
        Some(end) if end <= buf.len() => end,
        _ => return false,
    };
    buf[*cursor..end].copy_from_slice(bytes);
    *cursor = end;
    true
}

/// A linear append-only log living in caller-owned memory (typically a page
/// the HIP will later publish the physical address of).
pub struct EventLog<'a> {
    buf: &'a mut [u8],
    cursor: usize,
    algorithms: HashAlgorithms,
}

impl<'a> EventLog<'a> {
    /// Writes the `"Spec ID Event03"` header entry declaring `algorithms`
    /// as the supported set, then returns the log ready to accept agile
    /// entries via [`EventLog::extend`].
    pub fn new(buf: &'a mut [u8], algorithms: HashAlgorithms) -> Option<Self> {
        let mut log = EventLog { buf, cursor: 0, algorithms };
        let header = Header {
            pcr: 0,
            event_type: EV_NO_ACTION,
            digest: [0; 20],
            event_size: 0,
            signature: SPEC_ID_EVENT03,
            class: 0,
            spec_version_minor: 0,
            spec_version_major: 2,
            spec_errata: 0,
            uintn_size: 2,
            algorithm_count: algorithms.iter().count() as u32,
        };
        let header_bytes =
            unsafe { core::slice::from_raw_parts((&header as *const Header).cast::<u8>(), core::mem::size_of::<Header>()) };
        if !append(log.buf, &mut log.cursor, header_bytes) {
            return None;
        }
        for alg in algorithms.iter() {
            let (id, size) = alg_entry(alg);
            let entry = AlgorithmEntry { alg: id, digest_size: size };
            let entry_bytes = unsafe {
                core::slice::from_raw_parts((&entry as *const AlgorithmEntry).cast::<u8>(), core::mem::size_of::<AlgorithmEntry>())
            };
            if !append(log.buf, &mut log.cursor, entry_bytes) {
                return None;
            }
        }
        Some(log)
    }

    /// Bytes written to the buffer so far, the log's own physical size
    /// (the HIP needs this to publish the log without re-walking it).
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    /// Atomically extends PCR `pcr` with every digest the TPM reports
    /// active, in SHA1/SHA2-256/SHA2-384/SHA2-512 order, and only on full
    /// success appends the corresponding agile entry to the log.
    pub fn extend(&mut self, pcr: u32, event_type: u32, digests: &Digests, tpm: &mut impl Pcrs, event_data: &[u8]) -> bool {
        let active = tpm.active_algorithms() & self.algorithms;

        let mut ok = true;
        if active.contains(HashAlgorithms::SHA1) {
            ok &= tpm.extend_sha1(pcr, &digests.sha1);
        }
        if active.contains(HashAlgorithms::SHA2_256) {
            ok &= tpm.extend_sha2_256(pcr, &digests.sha2_256);
        }
        if active.contains(HashAlgorithms::SHA2_384) {
            ok &= tpm.extend_sha2_384(pcr, &digests.sha2_384);
        }
        if active.contains(HashAlgorithms::SHA2_512) {
            ok &= tpm.extend_sha2_512(pcr, &digests.sha2_512);
        }
        if !ok {
            return false;
        }

        let mark = self.cursor;
        let digest_count = active.iter().count() as u32;
        let mut head = [0u8; 12];
        head[0..4].copy_from_slice(&pcr.to_ne_bytes());
        head[4..8].copy_from_slice(&event_type.to_ne_bytes());
        head[8..12].copy_from_slice(&digest_count.to_ne_bytes());
        if !append(self.buf, &mut self.cursor, &head) {
            self.cursor = mark;
            return false;
        }

        for alg in active.iter() {
            let (id, _) = alg_entry(alg);
            if !append(self.buf, &mut self.cursor, &id.to_ne_bytes()) {
                self.cursor = mark;
                return false;
            }
            let digest: &[u8] = if alg == HashAlgorithms::SHA1 {
                &digests.sha1
            } else if alg == HashAlgorithms::SHA2_256 {
                &digests.sha2_256
            } else if alg == HashAlgorithms::SHA2_384 {
                &digests.sha2_384
            } else if alg == HashAlgorithms::SHA2_512 {
                &digests.sha2_512
            } else {
                unreachable!()
            };
            if !append(self.buf, &mut self.cursor, digest) {
                self.cursor = mark;
                return false;
            }
        }

        let event_size = event_data.len() as u32;
        if !append(self.buf, &mut self.cursor, &event_size.to_ne_bytes()) || !append(self.buf, &mut self.cursor, event_data) {
            self.cursor = mark;
            return false;
        }

        true
    }
}
