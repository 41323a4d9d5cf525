// Interrupt Descriptor Table
//
// Builds and loads the 256-entry IDT. Every vector points at an assembly
// stub that normalizes the stack into a single frame layout before calling
// into Rust:
//
// - Vectors without a CPU-pushed error code get a zero pushed in its place,
//   so the frame shape is identical for all of them.
// - The stub pushes the vector number, then all fifteen general-purpose
//   registers, and hands the resulting frame pointer to the Rust handler.
// - swapgs runs on entry and exit, but only when the saved CS carries RPL
//   3: a fault taken in ring 0 already has the kernel gs base, and swapping
//   it there would corrupt the syscall path's view of the TSS.
//
// Vectors 0-20 are the architecturally defined exceptions; everything else
// funnels into a catch-all stub that reports vector 255. Double faults run
// on IST stack 1 so a broken kernel stack still produces a readable dump.

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
use core::arch::global_asm;
use core::mem::size_of;

use crate::arch::gdt;
use crate::log_info;

const LOG_ORIGIN: &str = "idt";

const IDT_ENTRIES: usize = 256;

const GATE_TYPE_INTERRUPT: u8 = 0x8E;
/// Trap gates leave IF untouched; used for breakpoints only.
const GATE_TYPE_TRAP: u8 = 0x8F;

/// Vectors where the CPU pushes an error code of its own.
const ERROR_CODE_VECTORS: [u8; 7] = [8, 10, 11, 12, 13, 14, 17];

/// Double fault runs on its own known-good stack.
const DOUBLE_FAULT_IST: u8 = 1;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        IdtEntry {
            offset_low: 0,
            selector: 0,
            ist: 0,
            type_attr: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    fn new(handler: u64, type_attr: u8, ist: u8) -> Self {
        IdtEntry {
            offset_low: handler as u16,
            selector: gdt::KERNEL_CODE_SELECTOR,
            ist,
            type_attr,
            offset_mid: (handler >> 16) as u16,
            offset_high: (handler >> 32) as u32,
            reserved: 0,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u64,
}

#[repr(align(16))]
struct Idt([IdtEntry; IDT_ENTRIES]);

static mut IDT: Idt = Idt([IdtEntry::missing(); IDT_ENTRIES]);

// Entry stubs. Generated as data-driven assembly: one flavor pushes a fake
// zero where the CPU would have pushed an error code, the other relies on
// the CPU's own push, and both fall through to the common register-save
// path. The swapgs tests read the saved CS (at rsp+24 on entry, rsp+8
// after the frame is popped) and check RPL.
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
global_asm!(
    r#"
.macro no_error_stub vector
    .global vector_stub_\vector
vector_stub_\vector:
    push 0
    push \vector
    jmp exception_common
.endm

.macro error_code_stub vector
    .global vector_stub_\vector
vector_stub_\vector:
    push \vector
    jmp exception_common
.endm

no_error_stub 0
no_error_stub 1
no_error_stub 2
no_error_stub 3
no_error_stub 4
no_error_stub 5
no_error_stub 6
no_error_stub 7
error_code_stub 8
no_error_stub 9
error_code_stub 10
error_code_stub 11
error_code_stub 12
error_code_stub 13
error_code_stub 14
no_error_stub 15
no_error_stub 16
error_code_stub 17
no_error_stub 18
no_error_stub 19
no_error_stub 20

.global vector_stub_unknown
vector_stub_unknown:
    push 0
    push 255
    jmp exception_common

exception_common:
    test qword ptr [rsp + 24], 3
    jz 1f
    swapgs
1:
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15

    mov rdi, rsp
    call rust_exception_handler

    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax

    add rsp, 16
    test qword ptr [rsp + 8], 3
    jz 2f
    swapgs
2:
    iretq
"#
);

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
extern "C" {
    fn vector_stub_0();
    fn vector_stub_1();
    fn vector_stub_2();
    fn vector_stub_3();
    fn vector_stub_4();
    fn vector_stub_5();
    fn vector_stub_6();
    fn vector_stub_7();
    fn vector_stub_8();
    fn vector_stub_9();
    fn vector_stub_10();
    fn vector_stub_11();
    fn vector_stub_12();
    fn vector_stub_13();
    fn vector_stub_14();
    fn vector_stub_15();
    fn vector_stub_16();
    fn vector_stub_17();
    fn vector_stub_18();
    fn vector_stub_19();
    fn vector_stub_20();
    fn vector_stub_unknown();
}

/// Installs the exception stubs and loads the IDT.
pub fn init() {
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    unsafe {
        let stubs: [unsafe extern "C" fn(); 21] = [
            vector_stub_0,
            vector_stub_1,
            vector_stub_2,
            vector_stub_3,
            vector_stub_4,
            vector_stub_5,
            vector_stub_6,
            vector_stub_7,
            vector_stub_8,
            vector_stub_9,
            vector_stub_10,
            vector_stub_11,
            vector_stub_12,
            vector_stub_13,
            vector_stub_14,
            vector_stub_15,
            vector_stub_16,
            vector_stub_17,
            vector_stub_18,
            vector_stub_19,
            vector_stub_20,
        ];

        for entry in IDT.0.iter_mut() {
            *entry = IdtEntry::new(
                vector_stub_unknown as u64,
                GATE_TYPE_INTERRUPT,
                0,
            );
        }

        for (vector, stub) in stubs.iter().enumerate() {
            let type_attr = if vector == 3 {
                GATE_TYPE_TRAP
            } else {
                GATE_TYPE_INTERRUPT
            };
            let ist = if vector == 8 { DOUBLE_FAULT_IST } else { 0 };
            IDT.0[vector] = IdtEntry::new(*stub as u64, type_attr, ist);
        }

        let pointer = IdtPointer {
            limit: (IDT_ENTRIES * size_of::<IdtEntry>() - 1) as u16,
            base: core::ptr::addr_of!(IDT) as u64,
        };
        core::arch::asm!("lidt [{}]", in(reg) &pointer, options(nostack));
    }

    log_info!(
        LOG_ORIGIN,
        "IDT loaded: {} vectors, {} with CPU error codes",
        IDT_ENTRIES,
        ERROR_CODE_VECTORS.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_splits_the_handler_address_across_the_fields() {
        let entry = IdtEntry::new(0x1122_3344_5566_7788, GATE_TYPE_INTERRUPT, 0);
        assert_eq!({ entry.offset_low }, 0x7788);
        assert_eq!({ entry.offset_mid }, 0x5566);
        assert_eq!({ entry.offset_high }, 0x1122_3344);
        assert_eq!({ entry.selector }, gdt::KERNEL_CODE_SELECTOR);
        assert_eq!(entry.type_attr, GATE_TYPE_INTERRUPT);
    }

    #[test]
    fn entry_is_sixteen_bytes() {
        assert_eq!(size_of::<IdtEntry>(), 16);
    }
}
