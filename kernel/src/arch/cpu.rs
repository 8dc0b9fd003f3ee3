//! Per-core identification, interrupt masking, and translation control.

use crate::memory::PhysAddr;

/// Identifier of the core we are currently running on.
///
/// Reads the low affinity byte of `MPIDR_EL1`; boards in scope for this
/// kernel number their cores densely from 0 there.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn cpu_id() -> usize {
    let mpidr: u64;
    unsafe {
        core::arch::asm!("mrs {}, mpidr_el1", out(reg) mpidr, options(nomem, nostack));
    }
    (mpidr & 0xff) as usize
}

/// Hosted fallback: the test harness is single-core.
#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn cpu_id() -> usize {
    0
}

/// Install `root` as the user translation-table base and flush stale
/// translations.
///
/// # Safety
///
/// `root` must point at a valid, fully constructed translation-table
/// tree that stays alive for as long as it is installed.
#[cfg(target_arch = "aarch64")]
pub unsafe fn install_ttbr0(root: PhysAddr) {
    unsafe {
        core::arch::asm!(
            "msr ttbr0_el1, {}",
            "dsb ish",
            "tlbi vmalle1",
            "dsb ish",
            "isb",
            in(reg) root.as_usize() as u64,
            options(nostack),
        );
    }
}

/// Hosted fallback: there is no MMU to reprogram.
#[cfg(not(target_arch = "aarch64"))]
pub unsafe fn install_ttbr0(_root: PhysAddr) {}

/// Park the core until the next event.
///
/// `wfe` only wakes on SEV, the event stream, or an unmasked
/// interrupt, so every path that makes a process runnable must pair
/// with [`send_event`] or a parked core can miss the work entirely.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn wait_for_event() {
    unsafe { core::arch::asm!("wfe", options(nomem, nostack)) };
}

#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn wait_for_event() {
    core::hint::spin_loop();
}

/// Wake every core parked in [`wait_for_event`].
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn send_event() {
    unsafe { core::arch::asm!("sev", options(nomem, nostack)) };
}

/// Hosted fallback: counts signals so tests can observe that the
/// wakeup side actually kicks parked cores.
#[cfg(not(target_arch = "aarch64"))]
#[inline]
pub fn send_event() {
    host_events::SENT.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
}

/// Number of [`send_event`] signals issued so far (hosted builds only).
#[cfg(not(target_arch = "aarch64"))]
pub fn events_sent() -> usize {
    host_events::SENT.load(core::sync::atomic::Ordering::Relaxed)
}

#[cfg(not(target_arch = "aarch64"))]
mod host_events {
    use core::sync::atomic::AtomicUsize;

    pub static SENT: AtomicUsize = AtomicUsize::new(0);
}

/// IRQ masking on the current core.
///
/// Spinlocks disable interrupts for their critical sections; the saved
/// state travels with the lock so nesting restores correctly.
pub mod irq {
    /// Whether IRQs are currently enabled on this core.
    #[cfg(target_arch = "aarch64")]
    #[inline]
    pub fn enabled() -> bool {
        let daif: u64;
        unsafe {
            core::arch::asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack));
        }
        daif & (1 << 7) == 0
    }

    /// Disable IRQs, returning whether they were enabled before.
    #[cfg(target_arch = "aarch64")]
    #[inline]
    pub fn disable_save() -> bool {
        let was_enabled = enabled();
        unsafe { core::arch::asm!("msr daifset, #2", options(nomem, nostack)) };
        was_enabled
    }

    /// Restore the state saved by [`disable_save`].
    #[cfg(target_arch = "aarch64")]
    #[inline]
    pub fn restore(was_enabled: bool) {
        if was_enabled {
            unsafe { core::arch::asm!("msr daifclr, #2", options(nomem, nostack)) };
        }
    }

    // Hosted fallbacks: tests run with "interrupts" permanently off, so
    // disable/restore collapse to state bookkeeping that never flips.

    #[cfg(not(target_arch = "aarch64"))]
    #[inline]
    pub fn enabled() -> bool {
        false
    }

    #[cfg(not(target_arch = "aarch64"))]
    #[inline]
    pub fn disable_save() -> bool {
        false
    }

    #[cfg(not(target_arch = "aarch64"))]
    #[inline]
    pub fn restore(_was_enabled: bool) {}
}
