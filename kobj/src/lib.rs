/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Capability object space, the five kernel object kinds, their slab
//! allocation, and the mapping database that records every delegation for
//! recursive revocation.

#![no_std]

pub mod capability;
pub mod kobject;
pub mod mdb;
pub mod objspace;
pub mod slab;

pub use capability::Capability;
pub use kobject::{validate, Ec, EcState, Header, Kind, Pd, Pt, Sc, Sm, ValidateError};
pub use mdb::MdbNode;
pub use objspace::{ObjError, ObjSpace};
pub use slab::SlabCache;
