// Serial Port Driver (Kernel Debug I/O)
//
// Implements a minimal serial port driver for kernel debugging output.
// This module provides low-level access to the legacy COM1 UART (0x3F8)
// and serves as the byte sink for all kernel diagnostic text and for
// relayed user `write` system calls.
//
// Key responsibilities:
// - Initialize the COM1 serial port in a known-good configuration
// - Provide byte- and string-level output primitives
// - Integrate with Rust's `fmt::Write` for formatted output
// - Expose the `ByteSink` trait used by the syscall dispatcher
//
// Implementation details:
// - Direct port I/O via `in` / `out` instructions (x86_64 only)
// - UART is configured for 38400 baud (divisor = 3), 8N1, with a
//   loopback self-test before the port is put into normal operation
// - Transmit FIFO is polled (`is_transmit_empty`) before each write
// - Newlines are normalized to CRLF for terminal compatibility
//
// Concurrency and safety:
// - Global `SERIAL1` is protected by a spinlock
// - Interrupts are temporarily disabled during `_print` to avoid
//   interleaved output from privilege-crossing contexts
// - All hardware access is tightly scoped in small `unsafe` blocks
//
// The hosted test build routes `_print` to standard output instead of
// touching port I/O.

#![allow(dead_code)]

use core::fmt;

const COM1: u16 = 0x3F8;

/// Single-byte transmit capability. The syscall dispatcher relays user
/// `write` buffers through this seam, which keeps the dispatch logic
/// independent of the UART.
pub trait ByteSink {
    fn write_byte(&mut self, byte: u8);
}

pub struct SerialPort {
    base: u16,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        SerialPort { base }
    }

    pub fn init(&self) {
        unsafe {
            outb(self.base + 1, 0x00);
            outb(self.base + 3, 0x80);
            outb(self.base + 0, 0x03);
            outb(self.base + 1, 0x00);
            outb(self.base + 3, 0x03);
            outb(self.base + 2, 0xC7);
            outb(self.base + 4, 0x0B);
            outb(self.base + 4, 0x1E);
            outb(self.base + 0, 0xAE);

            if inb(self.base + 0) != 0xAE {
                return;
            }

            outb(self.base + 4, 0x0F);
        }
    }

    fn is_transmit_empty(&self) -> bool {
        unsafe { inb(self.base + 5) & 0x20 != 0 }
    }

    pub fn write_byte(&self, byte: u8) {
        while !self.is_transmit_empty() {
            core::hint::spin_loop();
        }

        unsafe {
            outb(self.base, byte);
        }
    }

    pub fn write_str(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        SerialPort::write_str(self, s);
        Ok(())
    }
}

impl ByteSink for SerialPort {
    fn write_byte(&mut self, byte: u8) {
        SerialPort::write_byte(self, byte);
    }
}

pub static SERIAL1: spin::Mutex<SerialPort> = spin::Mutex::new(SerialPort::new(COM1));

#[inline]
unsafe fn outb(port: u16, value: u8) {
    #[cfg(target_arch = "x86_64")]
    core::arch::asm!(
        "out dx, al",
        in("dx") port,
        in("al") value,
        options(nomem, nostack, preserves_flags)
    );
}

#[inline]
unsafe fn inb(port: u16) -> u8 {
    let ret: u8;
    #[cfg(target_arch = "x86_64")]
    core::arch::asm!(
        "in al, dx",
        out("al") ret,
        in("dx") port,
        options(nomem, nostack, preserves_flags)
    );
    ret
}

pub fn init() {
    SERIAL1.lock().init();
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    #[cfg(not(test))]
    {
        use core::fmt::Write;

        x86_64::instructions::interrupts::without_interrupts(|| {
            let _ = SERIAL1.lock().write_fmt(args);
        });
    }

    #[cfg(test)]
    std::print!("{}", args);
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}
