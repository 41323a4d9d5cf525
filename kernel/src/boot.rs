//! Boot-time data structures.
//!
//! This module intentionally contains **no** firmware-specific logic. It only
//! defines the neutral information block the platform boot stub passes into
//! the kernel proper: a flags word, and the list of modules (whole files) the
//! loader placed in physical memory alongside the kernel.

/// Bit 3 of the flags word: the module count and descriptor list are valid.
pub const BOOTINFO_FLAG_MODULES: u32 = 1 << 3;

#[repr(C)]
pub struct BootInfo {
    pub flags: u32,
    pub mods_count: u32,
    /// Physical address of an array of `mods_count` module descriptors.
    pub mods_addr: u64,
}

unsafe impl Send for BootInfo {}
unsafe impl Sync for BootInfo {}

impl BootInfo {
    pub const fn new(flags: u32, mods_count: u32, mods_addr: u64) -> Self {
        Self {
            flags,
            mods_count,
            mods_addr,
        }
    }

    pub const fn empty() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn modules_present(&self) -> bool {
        self.flags & BOOTINFO_FLAG_MODULES != 0 && self.mods_count > 0
    }

    pub fn modules(&self) -> ModuleIter {
        let count = if self.modules_present() {
            self.mods_count as usize
        } else {
            0
        };

        ModuleIter {
            base: self.mods_addr as *const ModuleDescriptor,
            index: 0,
            count,
        }
    }
}

/// Physical byte range of one loader-provided module, end exclusive.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    pub start: u64,
    pub end: u64,
}

impl ModuleDescriptor {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Module bytes live in loader-owned memory and are never reclaimed, so
    /// the `'static` borrow is sound for the kernel's entire run.
    ///
    /// # Safety
    ///
    /// `start..end` must describe memory the loader actually populated, and
    /// the identity physical mapping must cover it.
    pub unsafe fn bytes(&self) -> &'static [u8] {
        core::slice::from_raw_parts(self.start as *const u8, self.len())
    }
}

pub struct ModuleIter {
    base: *const ModuleDescriptor,
    index: usize,
    count: usize,
}

impl Iterator for ModuleIter {
    type Item = ModuleDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count || self.base.is_null() {
            return None;
        }

        let descriptor = unsafe { *self.base.add(self.index) };
        self.index += 1;
        Some(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_require_the_flag_bit() {
        let descriptors = [ModuleDescriptor { start: 0, end: 16 }];
        let addr = descriptors.as_ptr() as u64;

        let without_flag = BootInfo::new(0, 1, addr);
        assert!(!without_flag.modules_present());
        assert_eq!(without_flag.modules().count(), 0);

        let with_flag = BootInfo::new(BOOTINFO_FLAG_MODULES, 1, addr);
        assert!(with_flag.modules_present());
        assert_eq!(with_flag.modules().count(), 1);
    }

    #[test]
    fn iterator_walks_every_descriptor() {
        let descriptors = [
            ModuleDescriptor { start: 0x1000, end: 0x2000 },
            ModuleDescriptor { start: 0x3000, end: 0x3004 },
        ];
        let info = BootInfo::new(BOOTINFO_FLAG_MODULES, 2, descriptors.as_ptr() as u64);

        let collected: Vec<_> = info.modules().collect();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].len(), 0x1000);
        assert_eq!(collected[1].len(), 4);
        assert!(!collected[1].is_empty());
    }
}
