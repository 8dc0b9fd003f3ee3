//! Context switch implementation.
//!
//! This module provides the low-level context switch used by the
//! scheduler. It saves the caller's callee-saved register set and stack
//! pointer into one context record and restores another; it performs no
//! locking and knows nothing about process state.

/// Saved register set for kernel context switches.
///
/// Only callee-saved registers need to be explicitly saved; the AAPCS64
/// calling convention already handles the caller-saved ones. Resuming a
/// context behaves as if its `cpu_switch` call just returned; a
/// brand-new process instead has `lr` pre-set to the fork-return entry
/// point.
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct Context {
    pub x19: u64,
    pub x20: u64,
    pub x21: u64,
    pub x22: u64,
    pub x23: u64,
    pub x24: u64,
    pub x25: u64,
    pub x26: u64,
    pub x27: u64,
    pub x28: u64,
    /// Frame pointer (x29).
    pub fp: u64,
    /// Link register (x30), where the restored context resumes.
    pub lr: u64,
    /// Stack pointer.
    pub sp: u64,
}

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            x19: 0,
            x20: 0,
            x21: 0,
            x22: 0,
            x23: 0,
            x24: 0,
            x25: 0,
            x26: 0,
            x27: 0,
            x28: 0,
            fp: 0,
            lr: 0,
            sp: 0,
        }
    }
}

/// Perform a context switch from `current` to `next`.
///
/// Saves the callee-saved registers and stack pointer into `*current`,
/// restores them from `*next`, and returns into `next`'s saved link
/// register. Control comes back to the caller only when some later
/// switch restores `*current`.
///
/// # Safety
///
/// - Both pointers must be valid, aligned, and distinct.
/// - `*next` must be a properly initialized context whose stack is not
///   in use by any running core.
#[cfg(target_arch = "aarch64")]
#[unsafe(naked)]
pub unsafe extern "C" fn cpu_switch(_current: *mut Context, _next: *const Context) {
    // x0 = current context pointer
    // x1 = next context pointer
    core::arch::naked_asm!(
        // Save current context
        "stp x19, x20, [x0, #0x00]",
        "stp x21, x22, [x0, #0x10]",
        "stp x23, x24, [x0, #0x20]",
        "stp x25, x26, [x0, #0x30]",
        "stp x27, x28, [x0, #0x40]",
        "stp x29, x30, [x0, #0x50]",
        "mov x9, sp",
        "str x9, [x0, #0x60]",
        // Restore next context
        "ldp x19, x20, [x1, #0x00]",
        "ldp x21, x22, [x1, #0x10]",
        "ldp x23, x24, [x1, #0x20]",
        "ldp x25, x26, [x1, #0x30]",
        "ldp x27, x28, [x1, #0x40]",
        "ldp x29, x30, [x1, #0x50]",
        "ldr x9, [x1, #0x60]",
        "mov sp, x9",
        "ret",
    );
}

/// Hosted fallback. Unit tests exercise scheduling policy without ever
/// entering the switch, so reaching this is a bug.
#[cfg(not(target_arch = "aarch64"))]
pub unsafe extern "C" fn cpu_switch(_current: *mut Context, _next: *const Context) {
    unimplemented!("cpu_switch is only available on aarch64 targets")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_layout_matches_switch_offsets() {
        // The assembly addresses fields by fixed offset; the struct must
        // stay repr(C) with this exact layout.
        assert_eq!(core::mem::offset_of!(Context, x19), 0x00);
        assert_eq!(core::mem::offset_of!(Context, fp), 0x50);
        assert_eq!(core::mem::offset_of!(Context, lr), 0x58);
        assert_eq!(core::mem::offset_of!(Context, sp), 0x60);
        assert_eq!(core::mem::size_of::<Context>(), 0x68);
    }
}
