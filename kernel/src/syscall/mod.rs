// System Call Layer
//
// Fast-path kernel entry via the syscall/sysretq instruction pair. Three
// pieces live here:
//
// - MSR programming: STAR selects the segment bases for both directions of
//   the transition, LSTAR points at the entry stub, SFMASK clears IF while
//   the kernel runs, EFER.SCE turns the instruction on, and KERNEL_GS_BASE
//   holds the TSS address so the stub can find the kernel stack with a
//   single swapgs.
// - The entry stub itself: syscall does not switch stacks, so the stub
//   parks the user RSP in the TSS scratch slot, adopts rsp0, preserves the
//   return context (RCX holds the user RIP, R11 the user RFLAGS), and
//   shuffles the call number and arguments into the C ABI registers.
// - Dispatch: the number is masked to its low 24 bits (callers may use the
//   upper bits as tags), then routed. Unknown numbers are not errors; they
//   return zero so user code probing for features keeps running.
//
// Dispatch is written against the byte-sink seam rather than the serial
// port directly, which is what makes the routing testable off-target.

use crate::arch::gdt;
use crate::serial::ByteSink;
use crate::{log_info, log_panic};

const LOG_ORIGIN: &str = "syscall";

const MSR_EFER: u32 = 0xC000_0080;
const MSR_STAR: u32 = 0xC000_0081;
const MSR_LSTAR: u32 = 0xC000_0082;
const MSR_SFMASK: u32 = 0xC000_0084;
const MSR_KERNEL_GS_BASE: u32 = 0xC000_0102;

const EFER_SYSCALL_ENABLE: u64 = 1;
const RFLAGS_IF: u64 = 1 << 9;

/// Terminate the calling process. With a single process that means
/// halting the machine.
pub const SYS_EXIT: u64 = 1;
/// Write bytes to the kernel console.
pub const SYS_WRITE: u64 = 4;

/// Only the low 24 bits select the operation; the rest of the number is
/// caller-private tag space.
pub const CALL_NUMBER_MASK: u64 = 0x00FF_FFFF;

/// What the dispatcher wants done once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Place this value in RAX and sysretq back to the caller.
    Return(u64),
    /// The caller asked to exit; there is nowhere to return to.
    Terminate,
}

/// Programs the syscall MSRs. The GDT must already be live: STAR bakes in
/// selector arithmetic against its layout, and KERNEL_GS_BASE points into
/// its TSS.
pub fn init() {
    // STAR[47:32]: syscall loads CS from this base and SS from base + 8.
    // STAR[63:48]: sysretq loads SS from base + 8 and CS from base + 16,
    // both ORed with RPL 3. The sysret base is therefore 16 below the user
    // code descriptor, landing on the kernel data slot it never loads.
    let sysret_base = (gdt::USER_DATA_SELECTOR & !3) - 8;
    let star = (sysret_base as u64) << 48 | (gdt::KERNEL_CODE_SELECTOR as u64) << 32;

    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    unsafe {
        wrmsr(MSR_STAR, star);
        wrmsr(MSR_LSTAR, syscall_entry as u64);
        wrmsr(MSR_SFMASK, RFLAGS_IF);
        wrmsr(MSR_EFER, rdmsr(MSR_EFER) | EFER_SYSCALL_ENABLE);
        wrmsr(MSR_KERNEL_GS_BASE, gdt::tss_base());
    }

    log_info!(
        LOG_ORIGIN,
        "Syscall interface ready (STAR=0x{:016X}, gs base=0x{:X})",
        star,
        gdt::tss_base()
    );
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
unsafe fn wrmsr(msr: u32, value: u64) {
    core::arch::asm!(
        "wrmsr",
        in("ecx") msr,
        in("eax") value as u32,
        in("edx") (value >> 32) as u32,
        options(nostack, preserves_flags),
    );
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
unsafe fn rdmsr(msr: u32) -> u64 {
    let (low, high): (u32, u32);
    core::arch::asm!(
        "rdmsr",
        in("ecx") msr,
        out("eax") low,
        out("edx") high,
        options(nostack, preserves_flags),
    );
    (high as u64) << 32 | low as u64
}

// The entry stub. On arrival gs still holds the user base; after swapgs it
// points at the TSS, whose rsp0 field sits at offset 4 and whose first
// scratch slot (rsp1) at offset 12. RCX and R11 carry the user return
// context, and the argument registers are caller-saved in the C ABI, so
// every register user code expects to survive the instruction is pushed
// around the dispatcher call and popped before sysretq; only RAX comes
// back changed, carrying the return value. The push count stays even so
// the call site keeps the 16-byte alignment the ABI requires on top of the
// aligned rsp0.
macro_rules! syscall_entry_stub {
    () => {
        r#"
.global syscall_entry
syscall_entry:
    swapgs
    mov gs:[12], rsp
    mov rsp, gs:[4]

    push r11
    push rcx
    push rdi
    push rsi
    push rdx
    push r10
    push r8
    push r9

    mov rcx, rdx
    mov rdx, rsi
    mov rsi, rdi
    mov rdi, rax
    call rust_syscall_dispatcher

    pop r9
    pop r8
    pop r10
    pop rdx
    pop rsi
    pop rdi
    pop rcx
    pop r11

    mov rsp, gs:[12]
    swapgs
    sysretq
"#
    };
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
core::arch::global_asm!(syscall_entry_stub!());

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
extern "C" {
    fn syscall_entry();
}

/// Routes one system call. `arg0..arg2` arrive raw from user registers;
/// each operation decides what they mean.
pub fn dispatch(
    number: u64,
    arg0: u64,
    arg1: u64,
    arg2: u64,
    sink: &mut dyn ByteSink,
) -> SyscallOutcome {
    match number & CALL_NUMBER_MASK {
        SYS_WRITE => {
            // arg0 is the caller's stream tag (ignored: everything goes to
            // the console), arg1 the buffer, arg2 the length.
            let _ = arg0;
            if arg1 == 0 {
                return SyscallOutcome::Return(0);
            }

            let bytes =
                unsafe { core::slice::from_raw_parts(arg1 as *const u8, arg2 as usize) };
            for &byte in bytes {
                sink.write_byte(byte);
            }
            SyscallOutcome::Return(bytes.len() as u64)
        }
        SYS_EXIT => SyscallOutcome::Terminate,
        _ => SyscallOutcome::Return(0),
    }
}

/// C-ABI target of the entry stub: number in RDI, arguments in RSI, RDX,
/// RCX (already shuffled out of the syscall registers by the stub).
#[no_mangle]
pub extern "C" fn rust_syscall_dispatcher(number: u64, arg0: u64, arg1: u64, arg2: u64) -> u64 {
    let outcome = {
        let mut console = crate::serial::SERIAL1.lock();
        dispatch(number, arg0, arg1, arg2, &mut *console)
    };

    match outcome {
        SyscallOutcome::Return(value) => value,
        SyscallOutcome::Terminate => {
            log_panic!(LOG_ORIGIN, "Init exited; halting");
            loop {
                crate::arch::halt();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink(Vec<u8>);

    impl ByteSink for VecSink {
        fn write_byte(&mut self, byte: u8) {
            self.0.push(byte);
        }
    }

    #[test]
    fn write_relays_bytes_and_returns_the_count() {
        let mut sink = VecSink(Vec::new());
        let data = b"hello";

        let outcome = dispatch(
            SYS_WRITE,
            1,
            data.as_ptr() as u64,
            data.len() as u64,
            &mut sink,
        );

        assert_eq!(outcome, SyscallOutcome::Return(5));
        assert_eq!(sink.0, b"hello");
    }

    #[test]
    fn high_bits_of_the_number_are_ignored() {
        let mut sink = VecSink(Vec::new());
        let data = b"tagged";

        let outcome = dispatch(
            0x0200_0000 | SYS_WRITE,
            0,
            data.as_ptr() as u64,
            data.len() as u64,
            &mut sink,
        );

        assert_eq!(outcome, SyscallOutcome::Return(6));
        assert_eq!(sink.0, b"tagged");
    }

    #[test]
    fn exit_requests_termination() {
        let mut sink = VecSink(Vec::new());
        assert_eq!(dispatch(SYS_EXIT, 0, 0, 0, &mut sink), SyscallOutcome::Terminate);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn unknown_numbers_return_zero() {
        let mut sink = VecSink(Vec::new());
        assert_eq!(dispatch(7, 1, 2, 3, &mut sink), SyscallOutcome::Return(0));
        assert_eq!(dispatch(0, 0, 0, 0, &mut sink), SyscallOutcome::Return(0));
        assert!(sink.0.is_empty());
    }

    #[test]
    fn entry_stub_restores_every_register_it_saves() {
        let stub = syscall_entry_stub!();
        let pushed: Vec<&str> = stub
            .lines()
            .filter_map(|line| line.trim().strip_prefix("push "))
            .collect();
        let popped: Vec<&str> = stub
            .lines()
            .filter_map(|line| line.trim().strip_prefix("pop "))
            .collect();

        // Pops mirror the pushes exactly, and the count stays even so the
        // dispatcher call site keeps its 16-byte alignment.
        let mut expected = pushed.clone();
        expected.reverse();
        assert_eq!(popped, expected);
        assert_eq!(pushed.len() % 2, 0);

        // The user-side wrappers declare only RCX and R11 clobbered; all
        // other caller-saved registers must therefore survive the stub.
        for reg in ["rcx", "r11", "rdi", "rsi", "rdx", "r10", "r8", "r9"] {
            assert!(pushed.contains(&reg), "{} is not preserved", reg);
        }
    }

    #[test]
    fn zero_length_and_null_writes_are_harmless() {
        let mut sink = VecSink(Vec::new());
        let data = b"x";

        assert_eq!(
            dispatch(SYS_WRITE, 0, data.as_ptr() as u64, 0, &mut sink),
            SyscallOutcome::Return(0)
        );
        assert_eq!(
            dispatch(SYS_WRITE, 0, 0, 64, &mut sink),
            SyscallOutcome::Return(0)
        );
        assert!(sink.0.is_empty());
    }
}
