// Exception Handlers
//
// The Rust side of exception handling. The assembly stubs deliver every
// fault and trap here with a uniform frame: all fifteen general-purpose
// registers, the vector number, the (possibly synthesized) error code, and
// the CPU-pushed interrupt frame. Handling is diagnostic only: the kernel
// dumps as much context as it can decode and halts. There is no recovery,
// no signal delivery, and no demand paging to retry.

use crate::arch;
use crate::log_panic;

const LOG_ORIGIN: &str = "exception";

const VECTOR_BREAKPOINT: u64 = 3;
const VECTOR_GENERAL_PROTECTION: u64 = 13;
const VECTOR_PAGE_FAULT: u64 = 14;

/// Architecturally defined exception names, indexed by vector.
const EXCEPTION_NAMES: [&str; 32] = [
    "Divide Error",
    "Debug",
    "Non-Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating Point",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating Point",
    "Virtualization",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

/// Register state as laid down by the entry stubs. Field order mirrors the
/// push sequence exactly; the stubs and this struct must change together.
#[repr(C)]
pub struct InterruptFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub exception_number: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

const _: () = assert!(core::mem::size_of::<InterruptFrame>() == 22 * 8);

fn exception_name(vector: u64) -> &'static str {
    EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("Unknown Vector")
}

/// Entry point from the assembly stubs.
///
/// # Safety
///
/// `frame` must point at a live, fully populated `InterruptFrame` on the
/// current stack; only the stubs can uphold that.
#[no_mangle]
pub unsafe extern "C" fn rust_exception_handler(frame: *mut InterruptFrame) {
    let frame = &*frame;
    let vector = frame.exception_number;

    if vector == VECTOR_BREAKPOINT {
        log_panic!(
            LOG_ORIGIN,
            "Breakpoint at 0x{:016X} (continuing)",
            frame.rip
        );
        return;
    }

    log_panic!(
        LOG_ORIGIN,
        "EXCEPTION {}: {} (error code 0x{:X})",
        vector,
        exception_name(vector),
        frame.error_code
    );
    log_panic!(
        LOG_ORIGIN,
        "  RIP=0x{:016X} CS=0x{:04X} RFLAGS=0x{:08X}",
        frame.rip,
        frame.cs,
        frame.rflags
    );
    log_panic!(
        LOG_ORIGIN,
        "  RSP=0x{:016X} SS=0x{:04X} ring={}",
        frame.rsp,
        frame.ss,
        frame.cs & 3
    );
    log_panic!(
        LOG_ORIGIN,
        "  RAX=0x{:016X} RBX=0x{:016X} RCX=0x{:016X}",
        frame.rax,
        frame.rbx,
        frame.rcx
    );
    log_panic!(
        LOG_ORIGIN,
        "  RDX=0x{:016X} RSI=0x{:016X} RDI=0x{:016X}",
        frame.rdx,
        frame.rsi,
        frame.rdi
    );
    log_panic!(
        LOG_ORIGIN,
        "  RBP=0x{:016X} R8 =0x{:016X} R9 =0x{:016X}",
        frame.rbp,
        frame.r8,
        frame.r9
    );

    match vector {
        VECTOR_PAGE_FAULT => {
            let code = frame.error_code;
            log_panic!(
                LOG_ORIGIN,
                "  Faulting address: 0x{:016X} ({}, {}, from {})",
                arch::read_cr2(),
                if code & 1 != 0 { "protection violation" } else { "not present" },
                if code & 2 != 0 { "write" } else { "read" },
                if code & 4 != 0 { "user mode" } else { "kernel mode" }
            );
        }
        VECTOR_GENERAL_PROTECTION if frame.error_code != 0 => {
            log_panic!(
                LOG_ORIGIN,
                "  Segment selector involved: 0x{:X}",
                frame.error_code
            );
        }
        _ => {}
    }

    log_panic!(LOG_ORIGIN, "System halted");
    loop {
        arch::halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_the_architectural_vectors() {
        assert_eq!(exception_name(0), "Divide Error");
        assert_eq!(exception_name(8), "Double Fault");
        assert_eq!(exception_name(13), "General Protection Fault");
        assert_eq!(exception_name(14), "Page Fault");
        assert_eq!(exception_name(255), "Unknown Vector");
    }
}
