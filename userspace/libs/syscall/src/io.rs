// Console output and process exit
//
// The two calls the bootstrap kernel serves. Write goes to the kernel
// console regardless of the stream tag; exit does not return.

use crate::raw::{numbers::*, syscall1, syscall3};

/// Writes the whole buffer to the kernel console. Returns the number of
/// bytes the kernel accepted.
pub fn write(stream: u64, bytes: &[u8]) -> u64 {
    unsafe { syscall3(SYS_WRITE, stream, bytes.as_ptr() as u64, bytes.len() as u64) }
}

/// Terminates the calling process. The bootstrap kernel halts the machine;
/// the trailing loop only exists to satisfy the never type.
pub fn exit() -> ! {
    unsafe {
        syscall1(SYS_EXIT, 0);
    }
    loop {
        core::hint::spin_loop();
    }
}
