// Kernel entry point and system initialization
//
// This file defines the main kernel entry point (`kmain`) and orchestrates
// the full boot sequence after control is transferred from the boot loader
// to the kernel.
//
// It is responsible for bringing up the core subsystems in dependency order,
// locating the first user binary inside the boot archive, and performing the
// one-way drop to ring 3.
//
// Key responsibilities:
// - Serve as the kernel entry point after boot
// - Initialize early I/O (serial, logging)
// - Initialize the physical frame window and kernel heap
// - Adopt the loader-provided page table as the working address space
// - Configure CPU state (GDT/TSS, IDT, syscall MSRs)
// - Load the init binary from the boot module archive
// - Transfer execution permanently to user mode
//
// Design and implementation:
// - Kernel is `no_std` and `no_main` outside of the hosted test build
// - Initialization follows a strict, explicit ordering
// - The frame allocator and address space are locals owned by `kmain` and
//   passed down by reference; only hardware-mandated state is global
// - Failures during critical phases result in immediate halt
// - After the descent to ring 3 the only ways back into kernel code are
//   the exception vectors and the syscall entry stub
//
// Safety and correctness notes:
// - Boot-provided structures are treated as immutable
// - The system does not continue if the init binary is missing
// - Panic handler halts the CPU to avoid undefined behavior

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

extern crate alloc;

mod arch;
mod boot;
mod build_info;
mod fs;
mod init_process;
mod interrupts;
mod log;
mod mm;
mod serial;
mod syscall;

use crate::arch::halt;
use crate::arch::gdt;
use crate::boot::BootInfo;
use crate::mm::pmm::{self, FrameAllocator, PAGE_SIZE};
use crate::mm::vm::AddressSpace;

const LOG_KERNEL_INIT: &str = "kernel:init";
const LOG_INIT_PROC: &str = "init";

const KERNEL_STACK_PAGES: usize = 8;

#[cfg(not(test))]
#[global_allocator]
static ALLOCATOR: mm::heap::KernelAllocator = mm::heap::KernelAllocator;

#[no_mangle]
pub unsafe extern "C" fn kmain(boot_info: &'static BootInfo) -> ! {
    serial::init();

    log_info!(LOG_KERNEL_INIT, "{}", build_info::BOOT_BANNER);

    let mut frames = FrameAllocator::new(pmm::FRAME_WINDOW_START, pmm::FRAME_WINDOW_END);
    mm::init(&mut frames);

    arch::enable_fsgsbase();

    let mut aspace = AddressSpace::adopt_active();
    log_info!(
        LOG_KERNEL_INIT,
        "Adopted boot page table, root at 0x{:X}",
        aspace.root().as_u64()
    );

    // Dedicated stack for privilege-crossing entries (exceptions, syscalls).
    let kernel_stack_top = match frames.allocate(KERNEL_STACK_PAGES) {
        Some(base) => base.as_u64() + (KERNEL_STACK_PAGES * PAGE_SIZE) as u64,
        None => {
            log_panic!(LOG_KERNEL_INIT, "FATAL: Cannot allocate kernel stack");
            loop {
                halt();
            }
        }
    };

    gdt::init(kernel_stack_top);
    interrupts::init();
    syscall::init();

    log_info!(LOG_INIT_PROC, "Loading init binary from boot archive...");
    match init_process::load_init(
        boot_info,
        &init_process::UserLayout::DEFAULT,
        &mut aspace,
        &mut frames,
    ) {
        Ok(image) => {
            log_info!(
                LOG_INIT_PROC,
                "init loaded: entry=0x{:X}, stack=0x{:X}, {} bytes",
                image.entry,
                image.stack_top,
                image.size
            );
            log_info!(LOG_KERNEL_INIT, "Descending to ring 3");
            arch::enter_user_mode(image.entry, image.stack_top)
        }
        Err(e) => {
            log_panic!(LOG_INIT_PROC, "FATAL: Failed to load init: {:?}", e);
            log_panic!(LOG_INIT_PROC, "The boot loader must provide a module");
            log_panic!(LOG_INIT_PROC, "archive containing an 'init' file.");
            log_panic!(LOG_INIT_PROC, "SYSTEM HALTED");
            loop {
                halt();
            }
        }
    }
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log_error!("PANIC", "{}", info);
    loop {
        halt();
    }
}
