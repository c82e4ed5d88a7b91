/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Root-task bootstrap and syscall dispatch: the glue that turns the
//! `ptab`/`allocator`/`memspace`/`kobj`/`sched`/`integrity`/`hal` crates
//! into the dataflow spec.md's `# OVERVIEW` describes — "user syscalls →
//! F validates capabilities via D → G runs IPC state machine → H
//! schedules → ...". Kept as a `#![no_std]` library so `cargo test` can
//! exercise dispatch logic on the host target; the actual entry point
//! lives in the `kernel` binary (`src/main.rs`) this package also builds.

#![no_std]

pub mod gsi;
pub mod idle;
pub mod pci;
pub mod platform;
pub mod roottask;
pub mod state;
pub mod syscall;

pub use state::KernelState;
pub use syscall::{dispatch, Leaf, Status, SyscallArgs};
