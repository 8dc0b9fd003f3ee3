//! Kernel error type.
//!
//! Only *recoverable* conditions are represented here: resource
//! exhaustion and bad arguments from the syscall boundary. Invariant
//! violations (remapping a present page, re-entering the scheduler in
//! the wrong state, ...) are logic bugs and panic instead; they are
//! never reported through this type.

use core::fmt;

/// Recoverable kernel failures, reported to the immediate caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The frame allocator is out of physical memory.
    OutOfMemory,
    /// No free slot in the process table.
    OutOfProcSlots,
    /// An address-space operation would cross the user ceiling.
    AddressOverflow,
    /// A virtual address is not mapped (or not user-accessible).
    BadAddress,
    /// A segment source returned fewer bytes than requested.
    ShortRead,
    /// Caller-supplied argument is out of range.
    InvalidArgument,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::OutOfMemory => write!(f, "out of physical memory"),
            KernelError::OutOfProcSlots => write!(f, "process table is full"),
            KernelError::AddressOverflow => write!(f, "address above user ceiling"),
            KernelError::BadAddress => write!(f, "bad user address"),
            KernelError::ShortRead => write!(f, "short read from segment source"),
            KernelError::InvalidArgument => write!(f, "invalid argument"),
        }
    }
}
