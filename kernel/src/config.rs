//! Kernel configuration constants.
//!
//! This module contains compile-time configuration for the kernel.
//! Values here affect memory layout, limits, and scheduling behavior.

/// Maximum number of CPUs supported.
pub const MAX_CPUS: usize = 4;

/// Maximum number of processes.
pub const MAX_PROCESSES: usize = 64;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Page size (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Kernel stack size per process.
///
/// One page; the trap frame and the saved context are carved off the
/// top of this allocation.
pub const KERNEL_STACK_SIZE: usize = 4096;

/// Exclusive upper bound of the user virtual address space.
///
/// `grow` refuses to extend an address space to or past this ceiling.
pub const USER_ADDRESS_TOP: usize = 1 << 38;

/// Number of levels in the translation-table tree.
pub const PT_LEVELS: usize = 4;

/// Entries per 4 KB translation table (512 × 8 bytes).
pub const ENTRIES_PER_TABLE: usize = 512;

/// Virtual span covered by one level-3 table (2 MB).
///
/// `shrink` skips forward by this much when an intermediate table is
/// absent, since none of the pages under it can be mapped.
pub const LEVEL3_SPAN: usize = 1 << 21;

/// Number of scheduling priority levels (0 = low, 1 = high).
pub const PRIORITY_LEVELS: u8 = 2;

/// Affinity mask allowing every core.
pub const ALL_CPUS: usize = usize::MAX;
