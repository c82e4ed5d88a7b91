/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! PCI requester-id to DMA-space assignment table, backing the
//! `assign_pci` syscall leaf. PCI/DMA spaces are not currently
//! kobj-capability-typed objects (see DESIGN.md), so the root task hands
//! out fixed device slots here rather than through the object space.

const DEVICE_COUNT: usize = 64;

#[derive(Clone, Copy)]
pub struct PciDevice {
    pub bdf: u16,
    pub dma_space: u8,
}

pub struct PciTable {
    entries: [Option<PciDevice>; DEVICE_COUNT],
}

impl PciTable {
    pub fn new() -> Self {
        PciTable { entries: [None; DEVICE_COUNT] }
    }

    /// Assigns `bdf` to `dma_space`, evicting any prior owner of the same
    /// slot. Slots are handed out by index, not searched for by `bdf`:
    /// the root task is expected to keep its own bdf-to-slot mapping.
    pub fn assign(&mut self, slot: u8, bdf: u16, dma_space: u8) {
        self.entries[slot as usize] = Some(PciDevice { bdf, dma_space });
    }

    pub fn device(&self, slot: u8) -> Option<PciDevice> {
        self.entries[slot as usize]
    }

    pub fn find(&self, bdf: u16) -> Option<(u8, PciDevice)> {
        self.entries
            .iter()
            .enumerate()
            .find_map(|(i, d)| d.filter(|d| d.bdf == bdf).map(|d| (i as u8, d)))
    }
}

impl Default for PciTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unassigned_slot_has_no_device() {
        let table = PciTable::new();
        assert!(table.device(0).is_none());
    }

    #[test]
    fn assigned_slot_reports_its_bdf_and_dma_space() {
        let mut table = PciTable::new();
        table.assign(3, 0x0800, 1);
        let dev = table.device(3).unwrap();
        assert_eq!(dev.bdf, 0x0800);
        assert_eq!(dev.dma_space, 1);
    }

    #[test]
    fn find_locates_a_device_by_bdf() {
        let mut table = PciTable::new();
        table.assign(5, 0x1000, 2);
        let (slot, dev) = table.find(0x1000).unwrap();
        assert_eq!(slot, 5);
        assert_eq!(dev.dma_space, 2);
    }
}
