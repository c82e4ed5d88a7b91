/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Shared panic diagnostics. The `kernel` binary crate's own
//! `#[panic_handler]` calls [`handler`]; kept as a library function (rather
//! than the attribute itself) so host-side unit tests across the workspace
//! keep Rust's own test-harness panic handler.

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

fn print_panic_info(info: &PanicInfo) {
    let (file, line, column) = match info.location() {
        Some(loc) => (loc.file(), loc.line(), loc.column()),
        None => ("???", 0, 0),
    };
    crate::println!(
        "kernel panic at {}:{}:{}\n{}",
        file,
        line,
        column,
        info.message().unwrap_or(&format_args!(""))
    );
}

/// Prints diagnostics then parks this CPU forever. Never returns.
pub fn handler(info: &PanicInfo) -> ! {
    prevent_reenter();
    print_panic_info(info);
    loop {
        core::hint::spin_loop();
    }
}

/// A second panic while already panicking halts immediately instead of
/// recursing back into console output that may itself be broken.
fn prevent_reenter() {
    static PANICKING: AtomicBool = AtomicBool::new(false);
    if PANICKING.swap(true, Ordering::Relaxed) {
        loop {
            core::hint::spin_loop();
        }
    }
}
