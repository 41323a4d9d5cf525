// Memory Management Subsystem
//
// Bring-up order matters here:
// 1. The frame allocator needs no setup beyond its window bounds; it is
//    constructed by `kmain` and threaded through by reference.
// 2. The heap takes its backing frames once, up front, so every later
//    allocation is a pointer bump with no PMM traffic.
// 3. The address-space manager adopts the loader's page table afterwards
//    and allocates intermediate tables on demand.

pub mod addr;
pub mod heap;
pub mod pmm;
pub mod vm;

pub use addr::PhysAddr;

use crate::log_info;

const LOG_ORIGIN: &str = "mm";

/// Base of the kernel's view of physical memory. The boot loader maps
/// physical memory at identity, so the offset is zero; every physical
/// dereference in the kernel goes through this single assumption.
pub const PHYSICAL_MEMORY_OFFSET: u64 = 0;

#[inline]
pub fn phys_to_virt(addr: PhysAddr) -> *mut u8 {
    (PHYSICAL_MEMORY_OFFSET + addr.as_u64()) as *mut u8
}

pub fn init(frames: &mut pmm::FrameAllocator) {
    heap::init(frames);

    log_info!(
        LOG_ORIGIN,
        "Memory online: {} KiB remaining in frame window",
        frames.remaining_bytes() / 1024
    );
}
