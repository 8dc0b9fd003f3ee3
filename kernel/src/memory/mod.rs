//! Physical memory and user address spaces.

pub mod frame;
pub mod page_table;

pub use frame::FrameAllocator;
pub use page_table::{PteFlags, UserPageTable};

use crate::config::PAGE_SIZE;

/// Offset of the kernel's direct map of physical memory.
///
/// Every frame is visible to the kernel at `phys + PHYS_OFFSET`. Hosted
/// builds hand out real heap memory as "frames", so their map is the
/// identity.
#[cfg(target_arch = "aarch64")]
pub const PHYS_OFFSET: usize = 0xFFFF_0000_0000_0000;

#[cfg(not(target_arch = "aarch64"))]
pub const PHYS_OFFSET: usize = 0;

/// A physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(usize);

impl PhysAddr {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE == 0
    }

    /// Kernel-visible pointer to this physical address.
    pub fn as_ptr(self) -> *mut u8 {
        (self.0 + PHYS_OFFSET) as *mut u8
    }
}

/// A virtual address in some user address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(usize);

impl VirtAddr {
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    pub const fn page_offset(self) -> usize {
        self.0 % PAGE_SIZE
    }

    pub const fn align_down(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }
}

/// Round `n` up to the next page boundary.
pub const fn page_round_up(n: usize) -> usize {
    (n + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Round `n` down to a page boundary.
pub const fn page_round_down(n: usize) -> usize {
    n & !(PAGE_SIZE - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(page_round_up(0), 0);
        assert_eq!(page_round_up(1), PAGE_SIZE);
        assert_eq!(page_round_up(PAGE_SIZE), PAGE_SIZE);
        assert_eq!(page_round_down(PAGE_SIZE + 17), PAGE_SIZE);
    }
}
