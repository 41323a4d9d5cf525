// Physical Frame Allocator (PMM)
//
// Hands out zero-initialized physical page frames from a fixed physical
// window. Allocation is a bump of a single frame-aligned pointer: ranges
// are contiguous, pairwise disjoint, and strictly increasing for the
// lifetime of the boot session.
//
// Design principles:
// - Simplicity and determinism suitable for early kernel initialization
// - Single-owner object constructed by `kmain` and passed by reference,
//   never ambient global state
// - Page-granular allocation with a fixed frame size (4 KiB)
//
// Implementation details:
// - `next_free` always stays frame-aligned and never exceeds `limit`
// - A request that would cross `limit` fails and leaves the pointer
//   untouched, so a failed caller can retry with a smaller count
// - Frames are zeroed through the identity physical-to-virtual mapping
//   before they are handed out
// - `free` accepts any frame and does nothing: physical memory is never
//   reclaimed in this design, and callers may not assume otherwise
//
// Limitations:
// - No reuse, no defragmentation, no memory zones
// - Single hardware thread only; adding cores requires a lock here

use core::ptr;

use super::addr::PhysAddr;
use crate::mm;

pub const PAGE_SIZE: usize = 4096;

/// Physical window the allocator serves at boot. Starts above the region
/// the loader uses for the kernel image and boot modules.
pub const FRAME_WINDOW_START: PhysAddr = PhysAddr::new(0x0100_0000);
pub const FRAME_WINDOW_END: PhysAddr = PhysAddr::new(0x0400_0000);

pub struct FrameAllocator {
    next_free: PhysAddr,
    limit: PhysAddr,
}

impl FrameAllocator {
    /// Both bounds must be frame-aligned; a misaligned start is rounded up
    /// so the alignment invariant holds from the first allocation.
    pub fn new(start: PhysAddr, limit: PhysAddr) -> Self {
        let aligned = super::addr::align_up(start.as_usize(), PAGE_SIZE);
        FrameAllocator {
            next_free: PhysAddr::new(aligned as u64),
            limit,
        }
    }

    /// Allocates `count` contiguous frames, zero-filled. Returns `None`
    /// without moving the free pointer when the request would cross the
    /// window limit.
    pub fn allocate(&mut self, count: usize) -> Option<PhysAddr> {
        if count == 0 {
            return None;
        }

        let bytes = (count as u64).checked_mul(PAGE_SIZE as u64)?;
        let start = self.next_free;
        let end = start.as_u64().checked_add(bytes)?;

        if end > self.limit.as_u64() {
            return None;
        }

        unsafe {
            ptr::write_bytes(mm::phys_to_virt(start), 0, bytes as usize);
        }

        self.next_free = PhysAddr::new(end);
        Some(start)
    }

    /// Accepted for API symmetry; performs no bookkeeping. Frames are
    /// leaked by design for the lifetime of the boot session.
    pub fn free(&mut self, _frame: PhysAddr) {}

    pub fn remaining_bytes(&self) -> u64 {
        self.limit.as_u64() - self.next_free.as_u64()
    }

    #[cfg(test)]
    fn next_free(&self) -> PhysAddr {
        self.next_free
    }
}
