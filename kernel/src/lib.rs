//! Argon kernel core: processes and virtual memory for a small
//! multiprocessor AArch64 kernel.
//!
//! The crate owns the process table, the per-core schedulers, and the
//! user address spaces. Boot, exception entry, drivers, and the real
//! filesystem are external collaborators; they reach in through the
//! narrow surfaces in [`arch`] and [`fs`].
//!
//! Hosted builds (including `cargo test`) compile the same code with
//! the architecture primitives replaced by inert fallbacks, so the
//! table, scheduler policy, and page-table logic run as ordinary unit
//! tests.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod error;
pub mod fs;
pub mod memory;
pub mod process;
pub mod sync;

pub use error::KernelError;

/// Bring the kernel core up on the boot core: hand over the frame
/// pool, create the first user process from `init_image`, and enter
/// this core's scheduler loop.
pub fn boot(frame_capacity: usize, init_image: &[u8]) -> ! {
    memory::frame::init_global(frame_capacity);
    if let Err(e) = process::first_user_process(
        process::process_table(),
        memory::frame::global(),
        init_image,
    ) {
        panic!("cannot create the first user process: {e}");
    }
    process::scheduler::run()
}

/// Entry point for every core after the boot core: straight into the
/// scheduler.
pub fn boot_secondary() -> ! {
    process::scheduler::run()
}
