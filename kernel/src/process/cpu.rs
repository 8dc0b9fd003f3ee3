//! Per-core scheduler state.

use core::cell::UnsafeCell;

use crate::arch::{self, Context};
use crate::config::MAX_CPUS;

/// State owned by one core.
pub struct Cpu {
    /// Slot of the process this core is running, if any.
    pub current: Option<usize>,
    /// Saved context of this core's scheduler loop.
    pub scheduler: Context,
}

impl Cpu {
    const fn new() -> Self {
        Self {
            current: None,
            scheduler: Context::zeroed(),
        }
    }
}

/// All per-core descriptors.
///
/// Each core only ever touches its own entry, which is what makes the
/// unsynchronized interior mutability sound.
pub struct CpuTable {
    cpus: [UnsafeCell<Cpu>; MAX_CPUS],
}

unsafe impl Sync for CpuTable {}

impl CpuTable {
    const fn new() -> Self {
        Self {
            cpus: [const { UnsafeCell::new(Cpu::new()) }; MAX_CPUS],
        }
    }
}

static CPUS: CpuTable = CpuTable::new();

/// This core's descriptor.
///
/// The returned reference must not be held across a point where the
/// process migrates cores, which in practice means interrupts are
/// disabled (a spinlock is held) for the duration of its use.
pub fn current() -> &'static mut Cpu {
    unsafe { &mut *CPUS.cpus[arch::cpu_id()].get() }
}

/// Slot of the process running on this core, if any.
pub fn current_slot() -> Option<usize> {
    current().current
}
