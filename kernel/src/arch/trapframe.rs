//! Saved user-mode register state.

/// Register state captured at exception entry and restored at exception
/// return.
///
/// The layout matches the exception vector's save sequence: processor
/// state first, then the user stack pointer, then `x0..=x30`. The
/// syscall return value is written into `regs[0]` (x0).
#[derive(Debug, Clone)]
#[repr(C)]
pub struct TrapFrame {
    /// Saved program status (`SPSR_EL1`).
    pub spsr: u64,
    /// Exception return address (`ELR_EL1`).
    pub elr: u64,
    /// User stack pointer (`SP_EL0`).
    pub sp: u64,
    /// General-purpose registers x0 through x30.
    pub regs: [u64; 31],
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            spsr: 0,
            elr: 0,
            sp: 0,
            regs: [0; 31],
        }
    }

    /// Set the value the user will observe in x0 on return.
    pub fn set_return_value(&mut self, value: u64) {
        self.regs[0] = value;
    }

    /// Point execution at `entry` with the user stack at `sp`, in user
    /// mode with interrupts enabled (SPSR all-clear selects EL0t).
    pub fn set_user_entry(&mut self, entry: u64, sp: u64) {
        self.spsr = 0;
        self.elr = entry;
        self.sp = sp;
    }
}
