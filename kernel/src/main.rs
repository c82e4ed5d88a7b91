/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Boot glue: `hal` bring-up, allocator init from the boot memory map, root
//! `Pd`/`Ec`/`Sc` construction, root capability install, the optional
//! `measured-launch` §4.J sequence, `Hip::build`, then idle.
//!
//! The assembly trampoline that lands the CPU here — multiboot/UEFI
//! handoff, long-mode transition, initial stack setup — is, like `hal`'s
//! trap-entry stub, a documented collaborator contract: [`BootInfo`] is the
//! shape it must fill in and [`kernel_entry`] the symbol it must call, but
//! the trampoline itself is not implemented in Rust here.

#![no_std]
#![no_main]

use allocator::{PhysRange, PAGE_SIZE};
use kernel::{roottask, KernelState};

/// What the boot trampoline collaborator must hand off: one usable
/// physical memory range and, optionally, the ACPI RSDP physical address
/// (0 if none was found).
#[repr(C)]
pub struct BootInfo {
    pub memory_base: u64,
    pub memory_len: u64,
    pub acpi_rsdp: u64,
}

const BOOT_GSI_COUNT: u32 = 16;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    hal::panic::handler(info)
}

/// The symbol the boot trampoline collaborator calls once it has built a
/// [`BootInfo`] and switched to its final execution mode.
///
/// # Safety
/// `info` must point at a valid, unshared `BootInfo`; `info.memory_base`/
/// `info.memory_len` must describe free, page-aligned physical memory
/// disjoint from the kernel image itself.
#[no_mangle]
pub unsafe extern "C" fn kernel_entry(info: *const BootInfo) -> ! {
    let info = unsafe { &*info };
    kernel_main(info)
}

fn kernel_main(info: &BootInfo) -> ! {
    let features = unsafe { hal::cpu::Features::detect() };

    // The object-space root table, its mapping-database node table, and the
    // HIP each get one hand-carved page at the front of the boot range,
    // rather than coming out of `PageAllocator`, so that `KernelState::new`'s
    // own allocator (built over the remainder) never double-accounts any of
    // them.
    assert!(
        info.memory_len as usize >= 3 * PAGE_SIZE,
        "boot memory range must hold at least three pages for the root object space, its node table, and the HIP"
    );
    let obj_root = info.memory_base as usize as *mut u8;
    let node_root = unsafe { obj_root.add(PAGE_SIZE) };
    let hip_page = unsafe { obj_root.add(2 * PAGE_SIZE) };
    unsafe { core::ptr::write_bytes(obj_root, 0, PAGE_SIZE) };
    unsafe { core::ptr::write_bytes(node_root, 0, PAGE_SIZE) };
    let memory = PhysRange {
        base: info.memory_base as usize + 3 * PAGE_SIZE,
        len: info.memory_len as usize - 3 * PAGE_SIZE,
    };

    let mut state = unsafe {
        KernelState::new(memory, obj_root as *mut ptab::Level, node_root as *mut ptab::Level)
    };
    let root = unsafe { kernel::roottask::bootstrap(&mut state, BOOT_GSI_COUNT) };

    #[cfg(feature = "measured-launch")]
    {
        let mut platform = kernel::platform::NullLaunchPlatform;
        if let Err(e) = integrity::launch::sequence(&mut platform, 0, 0, 0, None) {
            hal::println!("measured-launch: sequence failed: {:?}", e);
        }
    }

    let hip = integrity::HipBuilder::new()
        .cpu_topology(1, 0)
        .cpu_features(features)
        .acpi_rsdp(info.acpi_rsdp)
        .root_selectors(0, 0, 0, 0, root.gsi_count as u64 + roottask::SEL_GSI_BASE)
        .max_object_counts(32, 0, 0, 64, 0, 0)
        .build();
    unsafe { (hip_page as *mut integrity::Hip).write(hip) };

    kernel::idle::run(&mut state)
}
