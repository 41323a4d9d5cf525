// Global Descriptor Table and Task State Segment
//
// x86_64 flattens segmentation, but the GDT still carries the privilege
// machinery: the code/data descriptors that define rings 0 and 3, and the
// TSS descriptor the CPU consults for stack switching. The selector layout
// is load-bearing twice over:
//
// - sysretq derives the user selectors arithmetically from the STAR base:
//   user SS = base + 8, user CS = base + 16 (both with RPL 3). The user
//   data descriptor therefore sits immediately before the user code one.
// - iretq takes the user selectors verbatim from the stack frame, so the
//   constants below must match the descriptors at those slots exactly.
//
// The TSS earns its keep on every privilege crossing: rsp0 is the kernel
// stack the CPU switches to when an interrupt arrives from ring 3, rsp1 is
// repurposed as a scratch slot where the syscall entry parks the user RSP
// (syscall does not switch stacks on its own), and IST slot 1 gives double
// faults a known-good stack even when rsp0 itself is the problem.
//
// Layout:
//   0x00  null (mandatory)
//   0x08  kernel code
//   0x10  kernel data
//   0x18  user data   (RPL 3 when loaded)
//   0x20  user code   (RPL 3 when loaded)
//   0x28  TSS (16-byte system descriptor, two slots)

use core::mem::size_of;
use core::ptr::addr_of;

use crate::log_info;
use crate::mm::pmm::PAGE_SIZE;

const LOG_ORIGIN: &str = "gdt";

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const USER_DATA_SELECTOR: u16 = 0x18 | 3;
pub const USER_CODE_SELECTOR: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

// Long-mode descriptors. Base and limit are ignored for code/data in
// 64-bit mode; what matters are the present, DPL, type, and L bits.
const KERNEL_CODE_DESCRIPTOR: u64 = 0x00AF_9A00_0000_FFFF;
const KERNEL_DATA_DESCRIPTOR: u64 = 0x00AF_9200_0000_FFFF;
const USER_DATA_DESCRIPTOR: u64 = 0x00AF_F200_0000_FFFF;
const USER_CODE_DESCRIPTOR: u64 = 0x00AF_FA00_0000_FFFF;

const GDT_ENTRIES: usize = 7;

/// 64-bit TSS. No task switching; only the stack-switch fields and the
/// I/O permission bitmap base are live.
#[repr(C, packed)]
pub struct Tss {
    reserved0: u32,
    rsp0: u64,
    /// Scratch slot: the syscall entry stub stores the user RSP here while
    /// the kernel stack is active. Never used as an actual ring-1 stack.
    rsp1: u64,
    rsp2: u64,
    reserved1: u64,
    ist: [u64; 7],
    reserved2: u64,
    reserved3: u16,
    iomap_base: u16,
}

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u64,
}

static mut GDT: [u64; GDT_ENTRIES] = [0; GDT_ENTRIES];

static mut TSS: Tss = Tss {
    reserved0: 0,
    rsp0: 0,
    rsp1: 0,
    rsp2: 0,
    reserved1: 0,
    ist: [0; 7],
    reserved2: 0,
    reserved3: 0,
    iomap_base: 0,
};

/// Dedicated double-fault stack, handed to the CPU through IST slot 1.
#[repr(align(16))]
struct AlignedStack([u8; 2 * PAGE_SIZE]);

static mut DOUBLE_FAULT_STACK: AlignedStack = AlignedStack([0; 2 * PAGE_SIZE]);

/// Builds the GDT and TSS and makes them live. `kernel_rsp0` is the stack
/// the CPU switches to on any ring-3 interrupt; it gets aligned down to 16
/// bytes as the interrupt ABI requires.
pub fn init(kernel_rsp0: u64) {
    unsafe {
        TSS.rsp0 = kernel_rsp0 & !0xF;
        let df_stack = addr_of!(DOUBLE_FAULT_STACK.0) as u64 + (2 * PAGE_SIZE) as u64;
        TSS.ist[0] = df_stack & !0xF;
        // No I/O bitmap: a base equal to the segment limit means every
        // user-mode port access faults.
        TSS.iomap_base = size_of::<Tss>() as u16;

        GDT[0] = 0;
        GDT[(KERNEL_CODE_SELECTOR >> 3) as usize] = KERNEL_CODE_DESCRIPTOR;
        GDT[(KERNEL_DATA_SELECTOR >> 3) as usize] = KERNEL_DATA_DESCRIPTOR;
        GDT[((USER_DATA_SELECTOR & !3) >> 3) as usize] = USER_DATA_DESCRIPTOR;
        GDT[((USER_CODE_SELECTOR & !3) >> 3) as usize] = USER_CODE_DESCRIPTOR;
        write_tss_descriptor(addr_of!(TSS) as u64);

        load();
    }

    log_info!(
        LOG_ORIGIN,
        "GDT loaded: kernel CS=0x{:02X} user CS=0x{:02X} TSS rsp0=0x{:X}",
        KERNEL_CODE_SELECTOR,
        USER_CODE_SELECTOR,
        kernel_rsp0 & !0xF
    );
}

/// Points the ring-0 interrupt stack somewhere new, e.g. when switching
/// kernel stacks.
pub fn set_rsp0(rsp0: u64) {
    unsafe {
        TSS.rsp0 = rsp0 & !0xF;
    }
}

/// Address of the TSS, loaded into KERNEL_GS_BASE so the syscall stub can
/// reach rsp0 and the scratch slot through gs.
pub fn tss_base() -> u64 {
    addr_of!(TSS) as u64
}

/// 16-byte system descriptor across the two slots at TSS_SELECTOR. Type
/// 0x9 is "available 64-bit TSS"; the high slot holds base bits 63:32.
unsafe fn write_tss_descriptor(base: u64) {
    let limit = (size_of::<Tss>() - 1) as u64;
    let low = limit
        | (base & 0xFFFF) << 16
        | (base >> 16 & 0xFF) << 32
        | 0x89u64 << 40
        | (base >> 24 & 0xFF) << 56;
    let high = base >> 32;

    let slot = (TSS_SELECTOR >> 3) as usize;
    GDT[slot] = low;
    GDT[slot + 1] = high;
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
unsafe fn load() {
    use core::arch::asm;

    let pointer = GdtPointer {
        limit: (GDT_ENTRIES * size_of::<u64>() - 1) as u16,
        base: addr_of!(GDT) as u64,
    };

    // Reload CS with a far return; data segments with plain moves.
    asm!(
        "lgdt [{ptr}]",
        "lea {tmp}, [rip + 2f]",
        "push {cs}",
        "push {tmp}",
        "retfq",
        "2:",
        "mov ds, {ds:x}",
        "mov es, {ds:x}",
        "mov ss, {ds:x}",
        "xor {tmp:e}, {tmp:e}",
        "mov fs, {tmp:x}",
        "mov gs, {tmp:x}",
        ptr = in(reg) &pointer,
        cs = in(reg) KERNEL_CODE_SELECTOR as u64,
        ds = in(reg) KERNEL_DATA_SELECTOR as u64,
        tmp = out(reg) _,
    );

    asm!("ltr {sel:x}", sel = in(reg) TSS_SELECTOR, options(nostack, preserves_flags));
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
unsafe fn load() {}
