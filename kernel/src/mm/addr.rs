// Typed physical addresses.
//
// A `PhysAddr` is an opaque 64-bit byte offset into physical memory. It is
// never dereferenced directly; the only way to turn one into a pointer is
// `mm::phys_to_virt`, which documents the identity-mapping assumption in one
// place.

use core::fmt;

use super::pmm::PAGE_SIZE;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct PhysAddr(u64);

impl PhysAddr {
    pub const fn new(addr: u64) -> Self {
        PhysAddr(addr)
    }

    pub const fn zero() -> Self {
        PhysAddr(0)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub const fn is_frame_aligned(self) -> bool {
        self.0 % PAGE_SIZE as u64 == 0
    }

    /// Address `count` whole frames past this one.
    pub const fn add_frames(self, count: usize) -> Self {
        PhysAddr(self.0 + (count * PAGE_SIZE) as u64)
    }
}

impl fmt::Debug for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysAddr(0x{:X})", self.0)
    }
}

pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[allow(dead_code)]
pub const fn align_down(value: usize, align: usize) -> usize {
    value & !(align - 1)
}
