/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! A swappable global console, same shape as the teacher's `machine::console`:
//! a `NullLock`-guarded trait object, a registration function, and a
//! `null_console` fallback so early boot code always has something to print
//! into (and tests never crash on an unregistered sink).

#![allow(dead_code)]

use crate::sync::{interface::Mutex, NullLock};

pub mod interface {
    use core::fmt;

    pub trait Write {
        fn write_fmt(&self, args: fmt::Arguments) -> fmt::Result;
    }

    pub trait ConsoleOps {
        fn write_byte(&self, byte: u8);
        fn read_byte(&self) -> u8 {
            0
        }
        fn flush(&self) {}
    }

    pub trait All: Write + ConsoleOps {}
}

pub mod null_console {
    use super::interface;
    use core::fmt;

    pub struct NullConsole;

    pub static NULL_CONSOLE: NullConsole = NullConsole;

    impl interface::Write for NullConsole {
        fn write_fmt(&self, _args: fmt::Arguments) -> fmt::Result {
            Ok(())
        }
    }

    impl interface::ConsoleOps for NullConsole {
        fn write_byte(&self, _byte: u8) {}
    }

    impl interface::All for NullConsole {}
}

static CONSOLE: NullLock<&'static (dyn interface::All + Sync)> =
    NullLock::new(&null_console::NULL_CONSOLE);

/// Swaps in a new global console (e.g. a probed [`crate::uart16550::Uart16550`]).
pub fn register_console(new_console: &'static (dyn interface::All + Sync)) {
    CONSOLE.lock(|c| *c = new_console);
}

pub fn console() -> &'static dyn interface::All {
    CONSOLE.lock(|c| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_console_swallows_output_without_panicking() {
        use interface::Write;
        console().write_fmt(format_args!("hello")).unwrap();
    }
}
