// Architecture Support Layer
//
// Every privileged x86_64 instruction the kernel executes funnels through
// this module: halting, control-register reads, TLB maintenance, CPU
// feature enablement, and the one-way descent to ring 3. Keeping the
// privileged surface in one place means the rest of the kernel is ordinary
// Rust that can also run hosted: each operation here compiles to a no-op
// (or a neutral value) outside a bare-metal x86_64 build.
//
// Key responsibilities:
// - CPU halt used by fatal-error loops and the idle path
// - CR2/CR3 reads for page-fault reporting and address-space adoption
// - Single-page TLB invalidation after mapping changes
// - FSGSBASE enablement when the CPU advertises it
// - The iretq descent that first enters user mode

pub mod gdt;

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
use core::arch::asm;

use crate::log_info;

const LOG_ORIGIN: &str = "arch";

/// Stops the CPU until the next interrupt. Fatal-error paths call this in
/// a loop.
#[inline(always)]
pub fn halt() {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    unsafe {
        asm!("hlt", options(nomem, nostack, preserves_flags));
    }
    #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
    core::hint::spin_loop();
}

/// Physical address of the active top-level page table, low 12 bits
/// (PCID/flags) stripped.
pub fn read_cr3() -> u64 {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    {
        let (frame, _) = x86_64::registers::control::Cr3::read();
        frame.start_address().as_u64()
    }
    #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
    0
}

/// Faulting linear address of the most recent page fault.
pub fn read_cr2() -> u64 {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    {
        let mut value: u64;
        unsafe {
            asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }
    #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
    0
}

/// Drops the TLB entry covering `virt`. Required after any change to a
/// live mapping; the CPU is free to keep serving the stale translation
/// otherwise.
pub fn invalidate_page(virt: usize) {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    x86_64::instructions::tlb::flush(x86_64::VirtAddr::new(virt as u64));
    #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
    let _ = virt;
}

/// Turns on the FSGSBASE instructions (wrfsbase and friends) when the CPU
/// reports them in CPUID leaf 7.
pub fn enable_fsgsbase() {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    {
        use x86_64::registers::control::{Cr4, Cr4Flags};

        let features = unsafe { core::arch::x86_64::__cpuid_count(7, 0) };
        if features.ebx & 1 != 0 {
            unsafe {
                Cr4::update(|flags| flags.insert(Cr4Flags::FSGSBASE));
            }
            log_info!(LOG_ORIGIN, "FSGSBASE enabled");
        } else {
            log_info!(LOG_ORIGIN, "FSGSBASE not supported by this CPU");
        }
    }
    #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
    log_info!(LOG_ORIGIN, "FSGSBASE: skipped on hosted build");
}

/// Drops to ring 3 at `entry` with the user stack at `stack_top`. Never
/// returns: the only ways back into the kernel afterwards are the syscall
/// and exception entry points.
///
/// Builds the five-word iretq frame by hand (SS, RSP, RFLAGS, CS, RIP)
/// with the user selectors and interrupts masked, then loads the user data
/// segments and executes iretq. The RPL-3 selectors in the frame are what
/// actually change the privilege level.
pub fn enter_user_mode(entry: usize, stack_top: usize) -> ! {
    log_info!(
        LOG_ORIGIN,
        "Entering user mode: entry=0x{:X} stack=0x{:X}",
        entry,
        stack_top
    );

    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    unsafe {
        asm!(
            "mov ds, {sel:x}",
            "mov es, {sel:x}",
            "push {sel}",       // SS
            "push {stack}",     // RSP
            "push {rflags}",    // RFLAGS: reserved bit set, IF clear
            "push {cs}",        // CS
            "push {entry}",     // RIP
            "iretq",
            sel = in(reg) gdt::USER_DATA_SELECTOR as u64,
            stack = in(reg) stack_top as u64,
            rflags = in(reg) 0x0002u64,
            cs = in(reg) gdt::USER_CODE_SELECTOR as u64,
            entry = in(reg) entry as u64,
            options(noreturn),
        );
    }

    #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
    loop {
        core::hint::spin_loop();
    }
}
