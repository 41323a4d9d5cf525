// Virtual Address-Space Manager
//
// Implements x86_64 4-level paging over the page table inherited from the
// boot loader. The kernel never builds a fresh root: `AddressSpace` adopts
// whatever CR3 points at and extends it in place, allocating intermediate
// tables on demand from the frame allocator.
//
// Address space model:
// - 4-level radix walk (L4 -> L3 -> L2 -> L1), 512 entries per level
// - Leaf mappings are 4 KiB at L1 or 2 MiB (huge) at L2; the loader's
//   table arrives full of 2 MiB kernel leaves
// - A present 2 MiB leaf encountered while installing a 4 KiB mapping is
//   split in place: a new L1 table reproduces the 512 contiguous sub-pages
//   with the original flags minus the huge bit, then the L2 entry is
//   rewritten as a table pointer
// - A huge leaf at L3 (1 GiB) rejects finer-grained mapping outright
//
// Design principles:
// - Correctness-first: explicit checks for alignment, explicit errors for
//   exhaustion instead of silent no-ops
// - Lazy allocation of page tables to minimize memory usage
// - Strong separation between physical allocation (PMM) and mapping logic;
//   the allocator is a parameter, never ambient state
//
// Correctness and safety notes:
// - The TLB entry for a remapped virtual address is explicitly invalidated
// - All page-table memory is allocated zeroed to avoid stale entries
// - Intermediate pointer entries carry permissive flags (present, writable,
//   user); the effective permission is whatever the leaf says
// - There is no unmap: once mapped, a page stays mapped for the kernel's
//   lifetime

use super::addr::PhysAddr;
use super::pmm::{FrameAllocator, PAGE_SIZE};
use crate::arch;
use crate::mm;

pub const HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;
const ENTRIES_PER_TABLE: usize = 512;
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    Unaligned,
    /// A 1 GiB leaf sits where a table pointer was expected; the request
    /// cannot be honored at finer granularity.
    HugeParent,
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFlags(u64);

impl PageFlags {
    pub const PRESENT: Self = Self(1 << 0);
    pub const WRITABLE: Self = Self(1 << 1);
    pub const USER: Self = Self(1 << 2);
    pub const HUGE: Self = Self(1 << 7);
    #[allow(dead_code)]
    pub const NO_EXECUTE: Self = Self(1u64 << 63);

    /// Flags for intermediate table-pointer entries. Permissive on purpose:
    /// restriction happens at the leaf.
    pub const fn table_pointer() -> Self {
        Self(Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::USER.bits())
    }

    pub const fn user_rw() -> Self {
        Self(Self::PRESENT.bits() | Self::WRITABLE.bits() | Self::USER.bits())
    }

    pub const fn without(self, other: PageFlags) -> Self {
        Self(self.bits() & !other.bits())
    }

    pub const fn contains(self, other: PageFlags) -> bool {
        self.bits() & other.bits() == other.bits()
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl core::ops::BitOr for PageFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.bits() | rhs.bits())
    }
}

impl core::ops::BitOrAssign for PageFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.bits();
    }
}

#[repr(transparent)]
#[derive(Clone, Copy)]
struct PageTableEntry(u64);

impl PageTableEntry {
    fn is_present(&self) -> bool {
        self.0 & PageFlags::PRESENT.bits() != 0
    }

    fn is_huge(&self) -> bool {
        self.0 & PageFlags::HUGE.bits() != 0
    }

    fn addr(&self) -> PhysAddr {
        PhysAddr::new(self.0 & ADDR_MASK)
    }

    fn flags(&self) -> PageFlags {
        PageFlags::from_bits(self.0 & !ADDR_MASK)
    }

    fn set(&mut self, addr: PhysAddr, flags: PageFlags) {
        self.0 = (addr.as_u64() & ADDR_MASK) | flags.bits();
    }
}

#[repr(align(4096))]
struct PageTable {
    entries: [PageTableEntry; ENTRIES_PER_TABLE],
}

const fn split_indices(virt: usize) -> (usize, usize, usize, usize) {
    (
        (virt >> 39) & 0x1FF,
        (virt >> 30) & 0x1FF,
        (virt >> 21) & 0x1FF,
        (virt >> 12) & 0x1FF,
    )
}

/// One 4-level page-table tree, identified by the physical address of its
/// root table. Owned and passed explicitly; there is no ambient "current
/// address space" in kernel code.
pub struct AddressSpace {
    root: PhysAddr,
}

impl AddressSpace {
    /// Adopts the table the CPU is currently translating through. The
    /// loader hands over a fully working table; the kernel extends it
    /// rather than replacing it.
    pub fn adopt_active() -> Self {
        AddressSpace {
            root: PhysAddr::new(arch::read_cr3() & ADDR_MASK),
        }
    }

    pub const fn from_root(root: PhysAddr) -> Self {
        AddressSpace { root }
    }

    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Maps the 4 KiB page at `virt` to the frame at `phys`. Intermediate
    /// tables are allocated on demand; a 2 MiB leaf in the way is split. An
    /// existing L1 leaf for `virt` is overwritten.
    pub fn map(
        &mut self,
        virt: usize,
        phys: PhysAddr,
        flags: PageFlags,
        frames: &mut FrameAllocator,
    ) -> Result<(), VmError> {
        if virt % PAGE_SIZE != 0 || !phys.is_frame_aligned() {
            return Err(VmError::Unaligned);
        }

        let (i4, i3, i2, i1) = split_indices(virt);

        let l4 = table_mut(self.root);
        let l3 = ensure_table(&mut l4.entries[i4], frames)?;

        if l3.entries[i3].is_present() && l3.entries[i3].is_huge() {
            return Err(VmError::HugeParent);
        }
        let l2 = ensure_table(&mut l3.entries[i3], frames)?;

        if l2.entries[i2].is_present() && l2.entries[i2].is_huge() {
            split_huge_entry(&mut l2.entries[i2], frames)?;
        }
        let l1 = ensure_table(&mut l2.entries[i2], frames)?;

        l1.entries[i1].set(phys, flags | PageFlags::PRESENT);
        arch::invalidate_page(virt);

        Ok(())
    }

    /// Installs a 2 MiB leaf at L2. Used to reproduce loader-style huge
    /// mappings; `map` will split it again if a finer mapping lands inside.
    pub fn map_2mib(
        &mut self,
        virt: usize,
        phys: PhysAddr,
        flags: PageFlags,
        frames: &mut FrameAllocator,
    ) -> Result<(), VmError> {
        if virt % HUGE_PAGE_SIZE != 0 || phys.as_usize() % HUGE_PAGE_SIZE != 0 {
            return Err(VmError::Unaligned);
        }

        let (i4, i3, i2, _) = split_indices(virt);

        let l4 = table_mut(self.root);
        let l3 = ensure_table(&mut l4.entries[i4], frames)?;

        if l3.entries[i3].is_present() && l3.entries[i3].is_huge() {
            return Err(VmError::HugeParent);
        }
        let l2 = ensure_table(&mut l3.entries[i3], frames)?;

        l2.entries[i2].set(phys, flags | PageFlags::PRESENT | PageFlags::HUGE);
        arch::invalidate_page(virt);

        Ok(())
    }

    /// Resolves `virt` to the frame address and flags of its leaf entry,
    /// through 4 KiB, 2 MiB, and 1 GiB leaves alike. The returned frame is
    /// the 4 KiB frame containing `virt`.
    pub fn translate(&self, virt: usize) -> Option<(PhysAddr, PageFlags)> {
        let (i4, i3, i2, i1) = split_indices(virt);

        let l4 = table_ref(self.root);
        let e4 = &l4.entries[i4];
        if !e4.is_present() {
            return None;
        }

        let l3 = table_ref(e4.addr());
        let e3 = &l3.entries[i3];
        if !e3.is_present() {
            return None;
        }
        if e3.is_huge() {
            let offset = (virt & (0x4000_0000 - 1)) & !(PAGE_SIZE - 1);
            return Some((PhysAddr::new(e3.addr().as_u64() + offset as u64), e3.flags()));
        }

        let l2 = table_ref(e3.addr());
        let e2 = &l2.entries[i2];
        if !e2.is_present() {
            return None;
        }
        if e2.is_huge() {
            let offset = (virt & (HUGE_PAGE_SIZE - 1)) & !(PAGE_SIZE - 1);
            return Some((PhysAddr::new(e2.addr().as_u64() + offset as u64), e2.flags()));
        }

        let l1 = table_ref(e2.addr());
        let e1 = &l1.entries[i1];
        if !e1.is_present() {
            return None;
        }

        Some((e1.addr(), e1.flags()))
    }
}

fn table_mut(addr: PhysAddr) -> &'static mut PageTable {
    unsafe { &mut *(mm::phys_to_virt(addr) as *mut PageTable) }
}

fn table_ref(addr: PhysAddr) -> &'static PageTable {
    unsafe { &*(mm::phys_to_virt(addr) as *const PageTable) }
}

/// Follows `entry` as a table pointer, allocating and installing a zeroed
/// table first when the entry is not present.
fn ensure_table(
    entry: &mut PageTableEntry,
    frames: &mut FrameAllocator,
) -> Result<&'static mut PageTable, VmError> {
    if !entry.is_present() {
        let frame = frames.allocate(1).ok_or(VmError::OutOfMemory)?;
        entry.set(frame, PageFlags::table_pointer());
    }

    Ok(table_mut(entry.addr()))
}

/// Replaces a 2 MiB leaf with an L1 table covering the same physical range:
/// 512 contiguous 4 KiB leaves carrying the original flags minus the huge
/// bit. Translation is unchanged until individual sub-pages are remapped.
fn split_huge_entry(
    entry: &mut PageTableEntry,
    frames: &mut FrameAllocator,
) -> Result<(), VmError> {
    let base = entry.addr();
    let flags = entry.flags().without(PageFlags::HUGE);

    let table_frame = frames.allocate(1).ok_or(VmError::OutOfMemory)?;
    let table = table_mut(table_frame);

    for (i, sub) in table.entries.iter_mut().enumerate() {
        sub.set(base.add_frames(i), flags);
    }

    entry.set(table_frame, PageFlags::table_pointer());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::testutil::Arena;

    fn space_with_root(frames: &mut FrameAllocator) -> AddressSpace {
        AddressSpace::from_root(frames.allocate(1).unwrap())
    }

    #[test]
    fn map_then_translate_yields_frame_and_flags() {
        let arena = Arena::new(32);
        let mut frames = arena.allocator();
        let mut aspace = space_with_root(&mut frames);

        let target = frames.allocate(1).unwrap();
        let flags = PageFlags::user_rw();
        aspace.map(0x40_0000, target, flags, &mut frames).unwrap();

        let (phys, got) = aspace.translate(0x40_0000).unwrap();
        assert_eq!(phys, target);
        assert!(got.contains(PageFlags::PRESENT));
        assert!(got.contains(PageFlags::USER));
        assert!(got.contains(PageFlags::WRITABLE));
    }

    #[test]
    fn unmapped_address_does_not_translate() {
        let arena = Arena::new(8);
        let mut frames = arena.allocator();
        let mut aspace = space_with_root(&mut frames);

        let target = frames.allocate(1).unwrap();
        aspace
            .map(0x40_0000, target, PageFlags::user_rw(), &mut frames)
            .unwrap();

        assert!(aspace.translate(0x40_1000).is_none());
        assert!(aspace.translate(0x8000_0000).is_none());
    }

    #[test]
    fn remap_overwrites_existing_leaf() {
        let arena = Arena::new(16);
        let mut frames = arena.allocator();
        let mut aspace = space_with_root(&mut frames);

        let first = frames.allocate(1).unwrap();
        let second = frames.allocate(1).unwrap();

        aspace
            .map(0x40_0000, first, PageFlags::user_rw(), &mut frames)
            .unwrap();
        aspace
            .map(0x40_0000, second, PageFlags::user_rw(), &mut frames)
            .unwrap();

        let (phys, _) = aspace.translate(0x40_0000).unwrap();
        assert_eq!(phys, second);
    }

    #[test]
    fn unaligned_requests_are_rejected() {
        let arena = Arena::new(8);
        let mut frames = arena.allocator();
        let mut aspace = space_with_root(&mut frames);
        let target = frames.allocate(1).unwrap();

        assert_eq!(
            aspace.map(0x40_0123, target, PageFlags::user_rw(), &mut frames),
            Err(VmError::Unaligned)
        );
        assert_eq!(
            aspace.map(
                0x40_0000,
                PhysAddr::new(target.as_u64() + 5),
                PageFlags::user_rw(),
                &mut frames
            ),
            Err(VmError::Unaligned)
        );
    }

    #[test]
    fn exhaustion_surfaces_as_out_of_memory() {
        let arena = Arena::new(2);
        let mut frames = arena.allocator();
        let mut aspace = space_with_root(&mut frames);
        let target = frames.allocate(1).unwrap();

        // Window is spent: the first intermediate table cannot be allocated.
        assert_eq!(
            aspace.map(0x40_0000, target, PageFlags::user_rw(), &mut frames),
            Err(VmError::OutOfMemory)
        );
    }

    #[test]
    fn splitting_a_huge_leaf_preserves_the_other_sub_pages() {
        let arena = Arena::new(32);
        let mut frames = arena.allocator();
        let mut aspace = space_with_root(&mut frames);

        let huge_virt = 0x20_0000;
        let huge_phys = PhysAddr::new(0x4000_0000);
        aspace
            .map_2mib(huge_virt, huge_phys, PageFlags::user_rw(), &mut frames)
            .unwrap();

        // Remap one 4 KiB page in the middle of the huge range.
        let replacement = frames.allocate(1).unwrap();
        let split_virt = huge_virt + 3 * PAGE_SIZE;
        aspace
            .map(split_virt, replacement, PageFlags::user_rw(), &mut frames)
            .unwrap();

        let (phys, _) = aspace.translate(split_virt).unwrap();
        assert_eq!(phys, replacement);

        // All 511 other sub-pages still resolve to their original
        // contiguous physical offsets with the original flags.
        for i in 0..512 {
            if i == 3 {
                continue;
            }
            let (phys, flags) = aspace.translate(huge_virt + i * PAGE_SIZE).unwrap();
            assert_eq!(phys.as_u64(), huge_phys.as_u64() + (i * PAGE_SIZE) as u64);
            assert!(flags.contains(PageFlags::USER));
            assert!(!flags.contains(PageFlags::HUGE));
        }
    }

    #[test]
    fn huge_leaf_at_l3_rejects_fine_mapping() {
        let arena = Arena::new(8);
        let mut frames = arena.allocator();
        let mut aspace = space_with_root(&mut frames);

        // Hand-craft a 1 GiB leaf: L4 entry -> L3 table whose entry 0 is a
        // present huge leaf.
        let l3_frame = frames.allocate(1).unwrap();
        let l4 = table_mut(aspace.root());
        l4.entries[0].set(l3_frame, PageFlags::table_pointer());
        let l3 = table_mut(l3_frame);
        l3.entries[0].set(
            PhysAddr::zero(),
            PageFlags::PRESENT | PageFlags::HUGE | PageFlags::WRITABLE,
        );

        let target = frames.allocate(1).unwrap();
        assert_eq!(
            aspace.map(0x40_0000, target, PageFlags::user_rw(), &mut frames),
            Err(VmError::HugeParent)
        );

        // The gigantic leaf still translates.
        let (phys, flags) = aspace.translate(0x40_0000).unwrap();
        assert_eq!(phys.as_u64(), 0x40_0000 & !(PAGE_SIZE as u64 - 1));
        assert!(flags.contains(PageFlags::HUGE));
    }
}
