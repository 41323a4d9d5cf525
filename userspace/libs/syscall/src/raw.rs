// Raw syscall invocation primitives
//
// Direct access to the syscall instruction. Unsafe because the caller must
// ensure the number and arguments mean what the kernel expects. The kernel
// clobbers RCX and R11 by architecture (they carry the return RIP and
// RFLAGS), so both are declared clobbered here.

/// Syscall numbers (must match kernel/src/syscall/mod.rs). Only the low 24
/// bits select the operation; upper bits are free for caller tags.
pub mod numbers {
    pub const SYS_EXIT: u64 = 1;
    pub const SYS_WRITE: u64 = 4;
}

/// Raw syscall with 1 argument
#[inline(always)]
pub unsafe fn syscall1(num: u64, arg0: u64) -> u64 {
    let result: u64;
    core::arch::asm!(
        "syscall",
        inlateout("rax") num => result,
        in("rdi") arg0,
        out("rcx") _,
        out("r11") _,
        options(nostack, preserves_flags)
    );
    result
}

/// Raw syscall with 2 arguments
#[inline(always)]
pub unsafe fn syscall2(num: u64, arg0: u64, arg1: u64) -> u64 {
    let result: u64;
    core::arch::asm!(
        "syscall",
        inlateout("rax") num => result,
        in("rdi") arg0,
        in("rsi") arg1,
        out("rcx") _,
        out("r11") _,
        options(nostack, preserves_flags)
    );
    result
}

/// Raw syscall with 3 arguments
#[inline(always)]
pub unsafe fn syscall3(num: u64, arg0: u64, arg1: u64, arg2: u64) -> u64 {
    let result: u64;
    core::arch::asm!(
        "syscall",
        inlateout("rax") num => result,
        in("rdi") arg0,
        in("rsi") arg1,
        in("rdx") arg2,
        out("rcx") _,
        out("r11") _,
        options(nostack, preserves_flags)
    );
    result
}
