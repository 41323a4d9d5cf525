// Ember Userspace Syscall Library
//
// Thin wrappers around the syscall instruction for programs running in
// ring 3. Standalone by design: no kernel dependencies, no allocator, no
// runtime beyond what the instruction itself needs.

#![no_std]
#![allow(dead_code)]

pub mod io;
pub mod raw;

pub use io::{exit, write};
pub use raw::{syscall1, syscall2, syscall3};
