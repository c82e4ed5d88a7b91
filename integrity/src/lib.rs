/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Measured-launch sequencing, the crypto-agile TPM event log, and the HIP
//! (Hypervisor Information Page) builder — the integrity plane's static
//! surface. Trap/exception entry and raw register/MSR/port access live in
//! `hal`; this crate only consumes [`hal::Features`] when composing the
//! HIP's feature bitmap.

#![no_std]

pub mod acm;
pub mod eventlog;
pub mod hip;
pub mod launch;
pub mod postlaunch;

pub use acm::AcmError;
pub use eventlog::{Digests, EventLog, HashAlgorithms, Pcrs};
pub use hip::{Features, Hip, HipBuilder};
pub use launch::{LaunchError, LaunchPlatform, MleRequest};
