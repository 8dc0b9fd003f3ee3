//! Interrupt-safe spinlock.
//!
//! Unlike `spin::Mutex`, this lock disables interrupts while held,
//! tracks which core holds it, and lets the scheduler keep a guard
//! alive across a context switch. A core that parks a process passes
//! its guard into the switch; the core that resumes the process gets
//! the guard back on the other side. `holding` and the per-core
//! interrupt nesting counter make that hand-off checkable.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::arch::{cpu_id, irq};
use crate::config::MAX_CPUS;

struct CoreIrqState {
    /// Depth of push_off nesting on this core.
    depth: AtomicU32,
    /// Whether interrupts were enabled before the outermost push_off.
    were_enabled: AtomicBool,
}

#[allow(clippy::declare_interior_mutable_const)]
const CORE_IRQ_INIT: CoreIrqState = CoreIrqState {
    depth: AtomicU32::new(0),
    were_enabled: AtomicBool::new(false),
};

static CORE_IRQ: [CoreIrqState; MAX_CPUS] = [CORE_IRQ_INIT; MAX_CPUS];

/// Disable interrupts on this core, remembering the pre-existing state
/// at the outermost nesting level.
fn push_off() {
    let enabled = irq::disable_save();
    let state = &CORE_IRQ[cpu_id()];
    if state.depth.load(Ordering::Relaxed) == 0 {
        state.were_enabled.store(enabled, Ordering::Relaxed);
    }
    state.depth.fetch_add(1, Ordering::Relaxed);
}

/// Undo one [`push_off`]; restores interrupts at the outermost level.
fn pop_off() {
    assert!(!irq::enabled(), "pop_off with interrupts enabled");
    let state = &CORE_IRQ[cpu_id()];
    let depth = state.depth.fetch_sub(1, Ordering::Relaxed);
    assert!(depth > 0, "unbalanced pop_off");
    if depth == 1 && state.were_enabled.load(Ordering::Relaxed) {
        irq::restore(true);
    }
}

/// A mutual-exclusion spinlock protecting `T`.
pub struct SpinLock<T> {
    locked: AtomicBool,
    /// Core holding the lock, plus one; 0 means unheld.
    holder: AtomicUsize,
    name: &'static str,
    data: UnsafeCell<T>,
}

// The lock serializes all access to `data`.
unsafe impl<T: Send> Sync for SpinLock<T> {}
unsafe impl<T: Send> Send for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            holder: AtomicUsize::new(0),
            name,
            data: UnsafeCell::new(data),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the current core holds this lock.
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed) && self.holder.load(Ordering::Relaxed) == cpu_id() + 1
    }

    /// Acquire the lock, spinning until it is free. Interrupts stay
    /// disabled on this core until the matching release.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        push_off();
        assert!(!self.holding(), "recursive acquire of {}", self.name);
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        self.holder.store(cpu_id() + 1, Ordering::Relaxed);
        SpinLockGuard { lock: self }
    }

    /// Release `guard` and hand back the lock it came from, so the
    /// caller can reacquire later without borrowing gymnastics.
    pub fn unlock(guard: SpinLockGuard<'_, T>) -> &SpinLock<T> {
        let lock = guard.lock;
        drop(guard);
        lock
    }

    /// Release the lock without going through a guard.
    ///
    /// Needed exactly once: a newly forked process resumes inside the
    /// scheduler's critical section and must release the lock the
    /// dispatching core acquired, but the guard object stayed on that
    /// core's stack.
    ///
    /// # Safety
    ///
    /// The current core must hold the lock, and no guard for this
    /// acquisition may be dropped afterwards.
    pub unsafe fn force_unlock(&self) {
        assert!(self.holding(), "force_unlock of unheld {}", self.name);
        self.holder.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        pop_off();
    }

    /// Pointer identity, used to detect "sleep while holding the very
    /// lock the sleep path would acquire".
    pub(crate) fn as_ptr(&self) -> *const () {
        self as *const _ as *const ()
    }

    /// Raw access to the protected data.
    ///
    /// # Safety
    ///
    /// The current core must hold the lock.
    pub(crate) unsafe fn raw(&self) -> *mut T {
        self.data.get()
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> SpinLockGuard<'_, T> {
    /// The lock this guard was taken from.
    pub fn source(&self) -> &SpinLock<T> {
        self.lock
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        assert!(self.lock.holding(), "release of unheld {}", self.lock.name);
        self.lock.holder.store(0, Ordering::Relaxed);
        self.lock.locked.store(false, Ordering::Release);
        pop_off();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_guards_data() {
        let lock = SpinLock::new("test", 0u32);
        {
            let mut guard = lock.lock();
            *guard += 7;
        }
        assert_eq!(*lock.lock(), 7);
    }

    #[test]
    fn holding_tracks_acquisition() {
        let lock = SpinLock::new("test", ());
        assert!(!lock.holding());
        let guard = lock.lock();
        assert!(lock.holding());
        drop(guard);
        assert!(!lock.holding());
    }

    #[test]
    fn unlock_returns_the_source_lock() {
        let lock = SpinLock::new("test", 5u8);
        let guard = lock.lock();
        let back = SpinLock::unlock(guard);
        assert!(core::ptr::eq(back, &lock));
        assert!(!lock.holding());
    }

    #[test]
    fn force_unlock_releases() {
        let lock = SpinLock::new("test", ());
        let guard = lock.lock();
        core::mem::forget(guard);
        unsafe { lock.force_unlock() };
        assert!(!lock.holding());
        // Must be reacquirable afterwards.
        drop(lock.lock());
    }
}
