/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Host, guest and DMA page-table spaces, and the dense PIO/MSR permission
//! bitmaps, all built over the [`ptab`] radix engine and the [`allocator`]
//! physical page allocator.

#![no_std]

pub mod attr;
pub mod cpuset;
pub mod mem;
pub mod msr;
pub mod pio;

pub use attr::{Cache, MemAttr};
pub use cpuset::CpuSet;
pub use mem::{DmaSpace, GstSpace, HstSpace, SwitchAction};
pub use msr::MsrSpace;
pub use pio::PioSpace;
