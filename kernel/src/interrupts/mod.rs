// Exception handling: the IDT, the assembly entry stubs, and the Rust
// handlers they call. External interrupt sources are not wired up; the
// table exists so faults in either ring produce a diagnostic dump instead
// of a silent triple fault.

pub mod handlers;
pub mod idt;

use crate::log_info;

const LOG_ORIGIN: &str = "interrupts";

pub fn init() {
    idt::init();
    log_info!(LOG_ORIGIN, "Exception handling initialized");
}
