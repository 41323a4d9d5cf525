// Kernel Logging Subsystem
//
// Implements the kernel's structured logging framework, providing
// multi-level log output for diagnostics, debugging, and crash analysis
// during bring-up.
//
// Key responsibilities:
// - Provide standardized log levels (Debug, Info, Warn, Error, Panic)
// - Attach a subsystem origin to every log entry
// - Include source location only for DEBUG entries (file:line)
// - Output logs to the serial port unconditionally
//
// Design principles:
// - Zero-cost filtering: log messages below the current level are dropped early
// - Early-boot friendly: works before the heap or user space exists
// - Deterministic output suitable for debugging kernel bring-up
//
// Correctness and safety notes:
// - Uses `unsafe` global state; assumes serialized access during early boot
// - Serial output is always enabled and considered the ground truth

use core::fmt;
use crate::serial;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
#[allow(dead_code)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Panic = 4,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
            LogLevel::Panic => "PANIC",
        }
    }
}

static mut CURRENT_LOG_LEVEL: LogLevel = LogLevel::Debug;

#[allow(dead_code)]
pub fn set_level(level: LogLevel) {
    unsafe {
        CURRENT_LOG_LEVEL = level;
    }
}

pub fn get_level() -> LogLevel {
    unsafe { CURRENT_LOG_LEVEL }
}

pub fn _log(level: LogLevel, origin: &str, args: fmt::Arguments, file: &str, line: u32) {
    if level < get_level() {
        return;
    }

    if level == LogLevel::Debug {
        serial::_print(format_args!(
            "[{}] [{}] {} ({}:{})\n",
            level.as_str(),
            origin,
            args,
            file,
            line
        ));
    } else {
        serial::_print(format_args!(
            "[{}] [{}] {}\n",
            level.as_str(),
            origin,
            args
        ));
    }
}

#[macro_export]
macro_rules! log_debug {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Debug,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_info {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Info,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_warn {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Warn,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_error {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Error,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_panic {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Panic,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}
