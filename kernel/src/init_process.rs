// Init Process Bootstrap
//
// Locates and loads the first user binary. The boot loader places the
// archive in memory as its first module; this module parses it, finds the
// file named "init", maps the fixed user load and stack regions, and copies
// the binary (a flat blob, no relocation, no ELF interpretation) to the
// load address.
//
// Key responsibilities:
// - Validate that the boot information block advertises a usable module
// - Parse the module's byte range as the boot archive
// - Look up the init file; its absence is a fatal boot error
// - Make the load and stack ranges user-accessible in the adopted address
//   space, splitting the loader's huge kernel mappings where necessary
// - Copy the file's exact byte content to the fixed load address
//
// The load/stack layout is a parameter rather than baked-in constants so
// the whole sequence can run against hosted memory in tests; `kmain` passes
// `UserLayout::DEFAULT`.

use crate::boot::BootInfo;
use crate::fs::archive::Archive;
use crate::fs::fd::{self, OpenFileTable};
use crate::fs::FsError;
use crate::mm::addr::align_up;
use crate::mm::pmm::{FrameAllocator, PAGE_SIZE};
use crate::mm::vm::{AddressSpace, PageFlags, VmError};
use crate::mm::PhysAddr;
use crate::{log_info, log_panic};

const LOG_ORIGIN: &str = "init";

/// Name the init binary is registered under in the archive root.
pub const INIT_NAME: &str = "init";

/// Where in the user address space the init image and stack live. Both
/// regions are identity-mapped, so the virtual addresses double as the
/// physical destinations of the copy.
pub struct UserLayout {
    pub load_base: usize,
    pub stack_top: usize,
    pub stack_pages: usize,
}

impl UserLayout {
    pub const DEFAULT: Self = Self {
        load_base: 0x0040_0000,
        stack_top: 0x0080_0000,
        stack_pages: 4,
    };
}

#[derive(Debug)]
pub enum InitError {
    /// The boot information block advertises no modules.
    NoBootModules,
    /// The first module exists but spans zero bytes.
    EmptyModule,
    /// The archive parsed but contains no file named "init".
    MissingInit,
    MapFailed(VmError),
    Io(FsError),
}

pub struct InitImage {
    pub entry: usize,
    pub stack_top: usize,
    pub size: usize,
}

/// Runs the whole locate-map-copy sequence. On success the image is in
/// place and the caller can descend to ring 3 with the returned entry
/// point and stack pointer.
pub fn load_init(
    boot_info: &BootInfo,
    layout: &UserLayout,
    aspace: &mut AddressSpace,
    frames: &mut FrameAllocator,
) -> Result<InitImage, InitError> {
    if !boot_info.modules_present() {
        log_panic!(LOG_ORIGIN, "FATAL: Boot loader provided no modules");
        return Err(InitError::NoBootModules);
    }

    let module = boot_info.modules().next().ok_or(InitError::NoBootModules)?;
    if module.is_empty() {
        log_panic!(LOG_ORIGIN, "FATAL: First boot module is empty");
        return Err(InitError::EmptyModule);
    }

    log_info!(
        LOG_ORIGIN,
        "Boot archive: 0x{:X}-0x{:X} ({} bytes)",
        module.start,
        module.end,
        module.len()
    );

    let bytes = unsafe { module.bytes() };
    let archive = Archive::parse(bytes);

    let node = match archive.root().lookup(INIT_NAME) {
        Some(node) => node,
        None => {
            log_panic!(
                LOG_ORIGIN,
                "FATAL: Archive has no '{}' entry ({} entries total)",
                INIT_NAME,
                archive.root().size()
            );
            return Err(InitError::MissingInit);
        }
    };

    let size = node.size();
    let image_pages = align_up(size.max(1), PAGE_SIZE) / PAGE_SIZE;

    // User-visible identity mappings over the load and stack ranges. The
    // loader covered this memory with kernel-only huge leaves; remapping at
    // 4 KiB granularity splits them on the way down.
    for i in 0..image_pages {
        let addr = layout.load_base + i * PAGE_SIZE;
        aspace
            .map(addr, PhysAddr::new(addr as u64), PageFlags::user_rw(), frames)
            .map_err(InitError::MapFailed)?;
    }

    for i in 0..layout.stack_pages {
        let addr = layout.stack_top - (i + 1) * PAGE_SIZE;
        aspace
            .map(addr, PhysAddr::new(addr as u64), PageFlags::user_rw(), frames)
            .map_err(InitError::MapFailed)?;
    }

    // Drain the file into the load region through the open-file table.
    let mut files = OpenFileTable::new();
    let descriptor = files.open(node, fd::O_RDONLY).map_err(InitError::Io)?;

    let dest = unsafe { core::slice::from_raw_parts_mut(layout.load_base as *mut u8, size) };
    let mut copied = 0usize;
    while copied < size {
        let count = files.read(descriptor, &mut dest[copied..]).map_err(InitError::Io)?;
        if count == 0 {
            break;
        }
        copied += count;
    }

    log_info!(
        LOG_ORIGIN,
        "Copied {} bytes to 0x{:X} ({} pages mapped)",
        copied,
        layout.load_base,
        image_pages + layout.stack_pages
    );

    Ok(InitImage {
        entry: layout.load_base,
        stack_top: layout.stack_top,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::{BootInfo, ModuleDescriptor, BOOTINFO_FLAG_MODULES};
    use crate::fs::archive::tests::build_archive;
    use crate::mm::testutil::Arena;

    fn boot_info_for(bytes: &[u8], descriptors: &mut Vec<ModuleDescriptor>) -> BootInfo {
        descriptors.push(ModuleDescriptor {
            start: bytes.as_ptr() as u64,
            end: bytes.as_ptr() as u64 + bytes.len() as u64,
        });
        BootInfo::new(BOOTINFO_FLAG_MODULES, 1, descriptors.as_ptr() as u64)
    }

    /// Layout carved out of hosted arena memory: the load region occupies
    /// the arena's first pages, the stack tops out a few pages later.
    fn arena_layout(region: &Arena) -> UserLayout {
        UserLayout {
            load_base: region.base(),
            stack_top: region.base() + 8 * PAGE_SIZE,
            stack_pages: 2,
        }
    }

    #[test]
    fn copies_init_bytes_to_the_load_address() {
        let content = b"\x90\x90\xEB\xFEinit flat binary image";
        let bytes = build_archive(&[("hello", b"hi"), ("init", content)]);
        let mut descriptors = Vec::new();
        let info = boot_info_for(&bytes, &mut descriptors);

        let tables = Arena::new(32);
        let region = Arena::new(16);
        let mut frames = tables.allocator();
        let mut aspace = AddressSpace::from_root(frames.allocate(1).unwrap());
        let layout = arena_layout(&region);

        let image = load_init(&info, &layout, &mut aspace, &mut frames).unwrap();

        assert_eq!(image.entry, layout.load_base);
        assert_eq!(image.stack_top, layout.stack_top);
        assert_eq!(image.size, content.len());

        let copied =
            unsafe { core::slice::from_raw_parts(layout.load_base as *const u8, content.len()) };
        assert_eq!(copied, content);
    }

    #[test]
    fn load_and_stack_ranges_become_user_accessible() {
        let bytes = build_archive(&[("init", b"code")]);
        let mut descriptors = Vec::new();
        let info = boot_info_for(&bytes, &mut descriptors);

        let tables = Arena::new(32);
        let region = Arena::new(16);
        let mut frames = tables.allocator();
        let mut aspace = AddressSpace::from_root(frames.allocate(1).unwrap());
        let layout = arena_layout(&region);

        load_init(&info, &layout, &mut aspace, &mut frames).unwrap();

        let (phys, flags) = aspace.translate(layout.load_base).unwrap();
        assert_eq!(phys.as_usize(), layout.load_base);
        assert!(flags.contains(PageFlags::USER));

        let stack_page = layout.stack_top - PAGE_SIZE;
        let (phys, flags) = aspace.translate(stack_page).unwrap();
        assert_eq!(phys.as_usize(), stack_page);
        assert!(flags.contains(PageFlags::WRITABLE));
    }

    #[test]
    fn missing_init_is_fatal() {
        let bytes = build_archive(&[("hello", b"hi")]);
        let mut descriptors = Vec::new();
        let info = boot_info_for(&bytes, &mut descriptors);

        let tables = Arena::new(16);
        let region = Arena::new(8);
        let mut frames = tables.allocator();
        let mut aspace = AddressSpace::from_root(frames.allocate(1).unwrap());

        let result = load_init(&info, &arena_layout(&region), &mut aspace, &mut frames);
        assert!(matches!(result, Err(InitError::MissingInit)));
    }

    #[test]
    fn absent_modules_are_fatal() {
        let info = BootInfo::empty();

        let tables = Arena::new(8);
        let region = Arena::new(8);
        let mut frames = tables.allocator();
        let mut aspace = AddressSpace::from_root(frames.allocate(1).unwrap());

        let result = load_init(&info, &arena_layout(&region), &mut aspace, &mut frames);
        assert!(matches!(result, Err(InitError::NoBootModules)));
    }
}
