//! Process lifecycle: creation, fork, exit, wait, growth.
//!
//! Each operation comes in two layers: a logic function that takes the
//! table, the frame allocator, and the acting slot explicitly, and a
//! thin wrapper that fills those in from the current core and the boot
//! globals. The logic layer is what the unit tests drive.

use crate::config::PAGE_SIZE;
use crate::error::KernelError;
use crate::fs;
use crate::fs::File;
use crate::memory::{frame, FrameAllocator, UserPageTable};
use crate::process::cpu;
use crate::process::scheduler;
use crate::process::table::{process_table, Channel, Pid, ProcState, ProcessTable, TableInner};

/// Create the first user process from an embedded bootstrap image: one
/// page mapped at address zero, entered at address zero with the user
/// stack at the page's top.
///
/// Called once per boot; the created process becomes the adoptive
/// parent of all orphans.
pub fn first_user_process(
    table: &ProcessTable,
    alloc: &FrameAllocator,
    image: &[u8],
) -> Result<Pid, KernelError> {
    let mut guard = table.lock();
    assert!(guard.init_slot.is_none(), "first user process already exists");
    let slot = guard.alloc().ok_or(KernelError::OutOfProcSlots)?;

    let p = &mut guard.procs[slot];
    let mut page_table = match UserPageTable::new(alloc) {
        Ok(t) => t,
        Err(e) => {
            p.reset();
            return Err(e);
        }
    };
    if let Err(e) = page_table.init_code(alloc, image) {
        page_table.destroy(alloc);
        p.reset();
        return Err(e);
    }
    p.page_table = Some(page_table);
    p.size = PAGE_SIZE;
    p.kstack
        .as_mut()
        .expect("embryo without kernel stack")
        .trapframe_mut()
        .set_user_entry(0, PAGE_SIZE as u64);
    p.cwd = Some(fs::root_inode());
    p.state = ProcState::Runnable;
    crate::arch::cpu::send_event();
    let pid = p.pid;

    guard.init_slot = Some(slot);
    log::info!("first user process: pid {pid} in slot {slot}");
    Ok(pid)
}

/// Duplicate the process in `parent_slot` into a fresh slot.
///
/// The child gets a byte-for-byte copy of the user address space and
/// trap frame (except x0, which reads 0 so the child can tell itself
/// apart), shares the parent's open files and working directory, and
/// starts `Runnable` at default priority with no core restriction.
pub fn fork_from(
    table: &ProcessTable,
    alloc: &FrameAllocator,
    parent_slot: usize,
) -> Result<Pid, KernelError> {
    let mut guard = table.lock();
    let child_slot = guard.alloc().ok_or(KernelError::OutOfProcSlots)?;
    let (parent, child) = guard.two_mut(parent_slot, child_slot);

    let parent_table = parent
        .page_table
        .as_ref()
        .expect("fork: parent has no address space");
    match parent_table.duplicate(alloc, parent.size) {
        Ok(t) => child.page_table = Some(t),
        Err(e) => {
            log::warn!("fork: out of memory duplicating pid {}", parent.pid);
            child.reset();
            return Err(e);
        }
    }
    child.size = parent.size;

    let parent_tf = parent
        .kstack
        .as_ref()
        .expect("fork: parent without kernel stack")
        .trapframe();
    let child_tf = child
        .kstack
        .as_mut()
        .expect("embryo without kernel stack")
        .trapframe_mut();
    *child_tf = parent_tf.clone();
    child_tf.set_return_value(0);

    for (child_fd, parent_fd) in child.files.iter_mut().zip(parent.files.iter()) {
        *child_fd = parent_fd.as_ref().map(File::dup);
    }
    child.cwd = parent.cwd.clone();
    child.parent = Some(parent_slot);
    child.state = ProcState::Runnable;
    // A parked core may be the one that gets to run the child.
    crate::arch::cpu::send_event();
    Ok(child.pid)
}

/// Fork the process running on this core.
pub fn fork() -> Result<Pid, KernelError> {
    let slot = cpu::current_slot().expect("fork with no current process");
    fork_from(process_table(), frame::global(), slot)
}

/// Release a process's file handles and working directory.
///
/// Taken out under the lock, dropped outside it: releasing the last
/// reference can reach into the filesystem.
fn release_resources(table: &ProcessTable, slot: usize) {
    let (files, cwd) = {
        let mut guard = table.lock();
        let p = &mut guard.procs[slot];
        let files = core::mem::replace(&mut p.files, core::array::from_fn(|_| None));
        (files, p.cwd.take())
    };
    drop(files);
    drop(cwd);
}

/// The table-locked tail of exit: wake the parent, hand children to the
/// first process (waking it too if any are already zombies), and mark
/// the slot `Zombie`.
///
/// Panics if `slot` is the first process; it must outlive everyone.
pub fn finish_exit(inner: &mut TableInner, slot: usize) {
    let init_slot = inner.init_slot.expect("exit before the first process exists");
    if slot == init_slot {
        panic!("init exiting");
    }

    if let Some(parent) = inner.procs[slot].parent {
        scheduler::wakeup_locked(inner, Channel::child_exit(parent));
    }

    let mut orphaned_zombie = false;
    for p in inner.procs.iter_mut() {
        if p.parent == Some(slot) {
            p.parent = Some(init_slot);
            if p.state == ProcState::Zombie {
                orphaned_zombie = true;
            }
        }
    }
    if orphaned_zombie {
        scheduler::wakeup_locked(inner, Channel::child_exit(init_slot));
    }

    inner.procs[slot].state = ProcState::Zombie;
}

/// Terminate the process running on this core. Does not return; the
/// slot lingers as a zombie until the parent reaps it.
pub fn exit_current() -> ! {
    let table = process_table();
    let slot = cpu::current_slot().expect("exit with no current process");
    release_resources(table, slot);

    let mut guard = table.lock();
    finish_exit(&mut guard, slot);
    let _guard = scheduler::sched(guard);
    panic!("zombie resumed");
}

/// Wait for a child of the process in `slot` to exit, reaping it.
///
/// Returns `None` immediately when there are no children or the waiter
/// has been killed; otherwise sleeps until a child turns zombie and
/// returns its pid after restoring the slot to the `Unused` defaults.
pub fn wait_from(table: &ProcessTable, alloc: &FrameAllocator, slot: usize) -> Option<Pid> {
    let mut guard = table.lock();
    loop {
        let mut have_kids = false;
        let mut zombie = None;
        for (i, p) in guard.procs.iter().enumerate() {
            if p.parent == Some(slot) {
                have_kids = true;
                if p.state == ProcState::Zombie {
                    zombie = Some(i);
                    break;
                }
            }
        }

        if let Some(child) = zombie {
            let p = &mut guard.procs[child];
            let pid = p.pid;
            if let Some(t) = p.page_table.take() {
                t.destroy(alloc);
            }
            p.reset();
            log::debug!("reaped pid {pid} from slot {child}");
            return Some(pid);
        }
        if !have_kids || guard.procs[slot].killed {
            return None;
        }

        guard = scheduler::sleep_holding_table(Channel::child_exit(slot), guard);
    }
}

/// Wait for a child of the process running on this core.
pub fn wait() -> Option<Pid> {
    let slot = cpu::current_slot().expect("wait with no current process");
    wait_from(process_table(), frame::global(), slot)
}

/// Grow (positive `delta`) or shrink (negative) the user address space
/// of the process in `slot`, returning the new size.
pub fn grow_process(
    inner: &mut TableInner,
    alloc: &FrameAllocator,
    slot: usize,
    delta: isize,
) -> Result<usize, KernelError> {
    let p = &mut inner.procs[slot];
    let page_table = p
        .page_table
        .as_mut()
        .expect("grow on process without address space");
    let old = p.size;
    let new = if delta >= 0 {
        let target = old
            .checked_add(delta as usize)
            .ok_or(KernelError::AddressOverflow)?;
        page_table.grow(alloc, old, target)?
    } else {
        let by = delta.unsigned_abs();
        if by > old {
            return Err(KernelError::InvalidArgument);
        }
        page_table.shrink(alloc, old, old - by)
    };
    p.size = new;
    Ok(new)
}

/// Resize the current process's address space and reinstall it, so a
/// shrink takes effect in the TLB immediately.
pub fn grow_current(delta: isize) -> Result<usize, KernelError> {
    let slot = cpu::current_slot().expect("grow with no current process");
    let mut guard = process_table().lock();
    let new = grow_process(&mut guard, frame::global(), slot, delta)?;
    guard.procs[slot]
        .page_table
        .as_ref()
        .expect("grow on process without address space")
        .install();
    Ok(new)
}

/// Mark the process with `pid` as killed, kicking it out of any sleep
/// so it notices promptly. The process dies when it next crosses the
/// kernel boundary.
pub fn kill_locked(inner: &mut TableInner, pid: Pid) -> Result<(), KernelError> {
    for p in inner.procs.iter_mut() {
        if p.state != ProcState::Unused && p.pid == pid {
            p.killed = true;
            if p.state == ProcState::Sleeping {
                p.state = ProcState::Runnable;
                crate::arch::cpu::send_event();
            }
            return Ok(());
        }
    }
    Err(KernelError::InvalidArgument)
}

/// [`kill_locked`] against the global table.
pub fn kill(pid: Pid) -> Result<(), KernelError> {
    kill_locked(&mut process_table().lock(), pid)
}

/// Log a one-line summary of every live slot.
///
/// Reads without taking the lock so it stays usable when a core is
/// wedged inside the table; the output may be torn.
pub fn dump(table: &ProcessTable) {
    let inner = unsafe { &*table.lock_ref().raw() };
    for (slot, p) in inner.procs.iter().enumerate() {
        if p.state == ProcState::Unused {
            continue;
        }
        log::debug!(
            "slot {slot}: pid {} {:?} priority {} size {:#x} killed {}",
            p.pid,
            p.state,
            p.priority,
            p.size,
            p.killed
        );
    }
}
