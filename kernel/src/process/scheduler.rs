//! Per-core scheduling.
//!
//! Every core runs [`run`] forever: pick a runnable process this core
//! is allowed to execute, switch to it, and take back over when the
//! process gives up the CPU. The process table lock is held across the
//! switch in both directions; whoever is running owns the guard.
//!
//! Dispatch policy is two priority levels with strict preference for
//! the high one, slot order within a level, and a per-process core
//! affinity mask. [`pick_next`] is a pure function so the policy is
//! testable without a second core in sight.

use crate::arch;
use crate::config::{MAX_CPUS, PRIORITY_LEVELS};
use crate::error::KernelError;
use crate::process::cpu;
use crate::process::table::{process_table, Channel, Proc, ProcState, TableInner};
use crate::sync::{SpinLock, SpinLockGuard};

/// Choose the next slot for `cpu_id` to run, or `None` if nothing is
/// eligible.
///
/// High priority strictly beats low; within a priority, the lowest
/// eligible slot index wins. A process whose affinity mask excludes
/// `cpu_id` is never chosen.
pub fn pick_next(table: &TableInner, cpu_id: usize) -> Option<usize> {
    for priority in (0..PRIORITY_LEVELS).rev() {
        for (slot, p) in table.procs.iter().enumerate() {
            if p.state == ProcState::Runnable
                && p.priority == priority
                && p.affinity >> cpu_id & 1 == 1
            {
                return Some(slot);
            }
        }
    }
    None
}

/// The per-core scheduler loop. Never returns.
pub fn run() -> ! {
    let table = process_table();
    let id = arch::cpu_id();
    log::info!("core {id}: scheduler online");
    loop {
        let mut guard = table.lock();
        let Some(slot) = pick_next(&guard, id) else {
            drop(guard);
            // Every path that makes a process runnable issues `sev`,
            // so parked cores cannot miss new work.
            arch::cpu::wait_for_event();
            continue;
        };

        let cpu = cpu::current();
        cpu.current = Some(slot);
        let p = &mut guard.procs[slot];
        p.state = ProcState::Running;
        #[cfg(feature = "trace-scheduler")]
        log::trace!("core {id}: dispatch pid {}", p.pid);
        p.page_table
            .as_ref()
            .expect("runnable process has no address space")
            .install();
        let ctx = p
            .kstack
            .as_mut()
            .expect("process without kernel stack")
            .context_ptr();
        // The guard rides across the switch: the process resumes inside
        // its own critical section and releases the lock itself.
        unsafe { arch::cpu_switch(&mut cpu.scheduler, ctx) };

        // The process came back to us; it updated its own state before
        // switching, again under the still-held lock.
        cpu::current().current = None;
        drop(guard);
    }
}

/// Give the CPU back to this core's scheduler loop.
///
/// The caller must already have moved the current process out of
/// `Running`; the table guard is handed across the switch and comes
/// back when the process is next dispatched.
pub fn sched(mut guard: SpinLockGuard<'_, TableInner>) -> SpinLockGuard<'_, TableInner> {
    let cpu = cpu::current();
    let slot = cpu.current.expect("sched with no current process");
    assert!(
        guard.procs[slot].state != ProcState::Running,
        "sched: process still marked running"
    );
    assert!(!arch::irq::enabled(), "sched with interrupts enabled");
    let ctx = guard.procs[slot]
        .kstack
        .as_mut()
        .expect("process without kernel stack")
        .context_ptr();
    unsafe { arch::cpu_switch(ctx, &cpu.scheduler) };
    guard
}

/// Voluntarily yield the current process's time slice.
pub fn yield_now() {
    let mut guard = process_table().lock();
    let slot = cpu::current_slot().expect("yield with no current process");
    guard.procs[slot].state = ProcState::Runnable;
    // Another core may be parked and allowed to take this process.
    arch::cpu::send_event();
    drop(sched(guard));
}

/// Park the current process on `channel`, atomically releasing the
/// caller's lock, and reacquire it once woken.
///
/// `guard` must not be the process table guard itself; `wait` uses
/// [`sleep_holding_table`] for that degenerate case.
pub fn sleep<'a, T>(channel: Channel, guard: SpinLockGuard<'a, T>) -> SpinLockGuard<'a, T> {
    let table = process_table();
    assert!(
        guard.source().as_ptr() != table.lock_ref().as_ptr(),
        "sleep: holding the table lock; use sleep_holding_table"
    );
    // Lock ordering: take the table lock before releasing the caller's
    // so no wakeup can slip between the two.
    let mut table_guard = table.lock();
    let lock = SpinLock::unlock(guard);

    let slot = cpu::current_slot().expect("sleep with no current process");
    table_guard.procs[slot].channel = Some(channel);
    table_guard.procs[slot].state = ProcState::Sleeping;
    let mut table_guard = sched(table_guard);
    table_guard.procs[slot].channel = None;
    drop(table_guard);

    lock.lock()
}

/// [`sleep`] for a caller already holding the table lock.
pub fn sleep_holding_table(
    channel: Channel,
    mut guard: SpinLockGuard<'_, TableInner>,
) -> SpinLockGuard<'_, TableInner> {
    let slot = cpu::current_slot().expect("sleep with no current process");
    guard.procs[slot].channel = Some(channel);
    guard.procs[slot].state = ProcState::Sleeping;
    let mut guard = sched(guard);
    guard.procs[slot].channel = None;
    guard
}

/// Wake every process sleeping on `channel`, returning how many woke.
///
/// Broadcast by design: each woken process re-checks its condition and
/// goes back to sleep if someone else got there first. Cores idling in
/// `wfe` are signalled whenever anything woke, since they would not
/// otherwise notice the new work.
pub fn wakeup_locked(table: &mut TableInner, channel: Channel) -> usize {
    let mut woken = 0;
    for p in table.procs.iter_mut() {
        if p.state == ProcState::Sleeping && p.channel == Some(channel) {
            p.state = ProcState::Runnable;
            woken += 1;
        }
    }
    if woken > 0 {
        arch::cpu::send_event();
    }
    woken
}

/// [`wakeup_locked`] behind a fresh table-lock acquisition.
pub fn wakeup(channel: Channel) -> usize {
    wakeup_locked(&mut process_table().lock(), channel)
}

/// Lower a process's priority one step, saturating at the bottom.
pub fn drop_priority(p: &mut Proc) {
    p.priority = p.priority.saturating_sub(1);
}

/// Raise a process's priority one step, saturating at the top.
pub fn raise_priority(p: &mut Proc) {
    p.priority = u8::min(p.priority + 1, PRIORITY_LEVELS - 1);
}

/// Restrict which cores may run a process.
///
/// The mask must name at least one core that exists.
pub fn set_affinity(p: &mut Proc, mask: usize) -> Result<(), KernelError> {
    if mask & ((1 << MAX_CPUS) - 1) == 0 {
        return Err(KernelError::InvalidArgument);
    }
    p.affinity = mask;
    Ok(())
}

/// Timer-interrupt hook: decay the running process's priority and give
/// the core back to the dispatcher.
pub fn on_timer_tick() {
    let Some(slot) = cpu::current_slot() else {
        return;
    };
    {
        let mut guard = process_table().lock();
        drop_priority(&mut guard.procs[slot]);
    }
    yield_now();
}

/// First landing point of a newly created process.
///
/// The dispatcher switched here with the table lock held and no guard
/// on this stack, so the lock is released by hand before heading out to
/// user space.
pub extern "C" fn fork_ret() -> ! {
    let table = process_table();
    let tf = {
        // Safe to touch our own slot: the lock is still held.
        let inner = unsafe { &mut *table.lock_ref().raw() };
        let slot = cpu::current_slot().expect("fork_ret with no current process");
        inner.procs[slot]
            .kstack
            .as_mut()
            .expect("process without kernel stack")
            .trapframe_ptr()
    };
    unsafe { table.lock_ref().force_unlock() };
    unsafe { arch::trap_return(tf) }
}
