/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Global interrupt assignment table: which SM (and which CPU) a GSI wakes,
//! backing the `assign_gsi` syscall leaf. A fixed array indexed by the
//! low 8 bits of the GSI number, adequate for the boot-time interrupt
//! routing this core hands out (PCI message-signalled interrupts get their
//! own vector directly and never go through this table).

use kobj::Sm;

const GSI_COUNT: usize = 256;

#[derive(Clone, Copy)]
pub struct GsiTarget {
    pub sm: *mut Sm,
    pub cpu: u32,
}

unsafe impl Send for GsiTarget {}

pub struct GsiTable {
    entries: [Option<GsiTarget>; GSI_COUNT],
}

impl GsiTable {
    pub fn new() -> Self {
        GsiTable { entries: [None; GSI_COUNT] }
    }

    pub fn assign(&mut self, gsi: u8, sm: *mut Sm, cpu: u32) {
        self.entries[gsi as usize] = Some(GsiTarget { sm, cpu });
    }

    pub fn target(&self, gsi: u8) -> Option<GsiTarget> {
        self.entries[gsi as usize]
    }
}

impl Default for GsiTable {
    fn default() -> Self {
        Self::new()
    }
}
