//! Architecture-specific primitives (AArch64).
//!
//! Everything the core needs from the machine is funneled through this
//! module: the register-level context switch, the per-core id, interrupt
//! masking, and installing a translation-table root. Each primitive has
//! a small, explicit contract; the rest of the kernel treats them as
//! opaque operations.
//!
//! On non-AArch64 targets (hosted builds and unit tests) the primitives
//! degrade to inert fallbacks: `cpu_id` is 0, interrupt masking is a
//! no-op, and the context switch is unreachable.

pub mod context;
pub mod cpu;
pub mod trapframe;

pub use context::{cpu_switch, Context};
pub use cpu::{cpu_id, install_ttbr0, irq};
pub use trapframe::TrapFrame;

#[cfg(target_arch = "aarch64")]
extern "C" {
    /// Provided by the exception front end at link time: restore user
    /// register state from the trap frame and `eret`.
    fn user_trap_return(tf: *mut TrapFrame) -> !;
}

/// Return to user space through the trap/exception layer.
///
/// # Safety
///
/// `tf` must point at a fully populated trap frame on the current
/// process's kernel stack.
#[cfg(target_arch = "aarch64")]
pub unsafe fn trap_return(tf: *mut TrapFrame) -> ! {
    unsafe { user_trap_return(tf) }
}

/// Hosted fallback: there is no user mode to return to.
#[cfg(not(target_arch = "aarch64"))]
pub unsafe fn trap_return(tf: *mut TrapFrame) -> ! {
    let _ = tf;
    unimplemented!("user return requires the exception front end")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "exception front end")]
    fn hosted_builds_have_no_user_return() {
        let mut tf = TrapFrame::zeroed();
        unsafe { trap_return(&mut tf) };
    }
}
