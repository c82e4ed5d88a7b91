/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Per-CPU scheduler: priority runqueues, the portal IPC state machine,
//! SC donation, and the hazard word every kernel exit path drains.

#![no_std]

pub mod donate;
pub mod hazard;
pub mod ipc;
pub mod runqueue;
pub mod ticket;

pub use hazard::{Hazard, Hazards};
pub use ipc::IpcError;
pub use runqueue::{RunQueue, DEFAULT_PRIO, DEFAULT_QUANTUM, PRIORITIES};
pub use ticket::TicketLock;
