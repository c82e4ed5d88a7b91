/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! x86_64 collaborator layer: register/trap-frame types, CPU feature
//! enumeration, raw MSR/port accessors, and a minimal UART console behind
//! the `print!`/`println!` macros. Trap entry itself is an assembly
//! collaborator this crate only describes a contract for (`regs::ExcHandler`),
//! never implements.

#![no_std]

pub mod macros;

pub mod console;
pub mod cpu;
pub mod msr;
pub mod panic;
pub mod port;
pub mod regs;
pub mod sync;
pub mod uart16550;

pub use cpu::Features;
pub use regs::{ExcHandler, ExcRegs, SysRegs};
pub use uart16550::Uart16550;
