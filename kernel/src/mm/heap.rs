// Kernel Heap Allocator
//
// A simple contiguous bump heap for dynamic kernel allocations (the archive
// layer's child vectors, mostly). Backing frames are taken from the frame
// allocator exactly once during `init`; afterwards allocation is a pointer
// bump and `dealloc` is a no-op, mirroring the no-reclamation policy of the
// frame allocator underneath it.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::null_mut;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::addr::align_up;
use super::pmm::{FrameAllocator, PAGE_SIZE};
use crate::arch::halt;
use crate::{log_info, log_panic};

const HEAP_SIZE: usize = 1024 * 1024;
const LOG_ORIGIN: &str = "heap";

static HEAP_START: AtomicUsize = AtomicUsize::new(0);
static HEAP_POS: AtomicUsize = AtomicUsize::new(0);
static HEAP_END: AtomicUsize = AtomicUsize::new(0);

pub struct KernelAllocator;

pub fn init(frames: &mut FrameAllocator) {
    let num_pages = HEAP_SIZE / PAGE_SIZE;
    let base = match frames.allocate(num_pages) {
        Some(base) => base,
        None => {
            log_panic!(LOG_ORIGIN, "FATAL: Cannot allocate kernel heap!");
            loop {
                halt();
            }
        }
    };

    let start = crate::mm::phys_to_virt(base) as usize;
    HEAP_START.store(start, Ordering::Relaxed);
    HEAP_POS.store(start, Ordering::Relaxed);
    HEAP_END.store(start + HEAP_SIZE, Ordering::Relaxed);

    log_info!(
        LOG_ORIGIN,
        "Initialized with {} bytes at 0x{:X}",
        HEAP_SIZE,
        start
    );
}

unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if HEAP_START.load(Ordering::Relaxed) == 0 {
            return null_mut();
        }

        let current = HEAP_POS.load(Ordering::Relaxed);
        let aligned = align_up(current, layout.align());
        let new_pos = aligned + layout.size();

        if new_pos > HEAP_END.load(Ordering::Relaxed) {
            return null_mut();
        }

        HEAP_POS.store(new_pos, Ordering::Relaxed);

        aligned as *mut u8
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {}
}

#[allow(dead_code)]
pub fn get_stats() -> (usize, usize) {
    let start = HEAP_START.load(Ordering::Relaxed);
    if start == 0 {
        return (0, 0);
    }

    let total = HEAP_END.load(Ordering::Relaxed) - start;
    let used = HEAP_POS.load(Ordering::Relaxed) - start;
    (total, used)
}
