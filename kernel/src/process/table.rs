//! The process table.
//!
//! One spinlock guards every field of every slot; holding its guard is
//! the capability required by all state-transition code. Slots are
//! reused: a reaped process returns its slot to the `Unused` defaults.

use alloc::boxed::Box;
use alloc::sync::Arc;

use lazy_static::lazy_static;

use crate::arch::{Context, TrapFrame};
use crate::config::{ALL_CPUS, KERNEL_STACK_SIZE, MAX_PROCESSES, NOFILE};
use crate::fs::{File, Inode};
use crate::memory::UserPageTable;
use crate::process::scheduler;
use crate::sync::{SpinLock, SpinLockGuard};

/// Process identifier. Zero is reserved for unused slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Pid(pub u32);

impl core::fmt::Display for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Embryo,
    Runnable,
    Running,
    Sleeping,
    Zombie,
}

/// An arbitrary token naming what a sleeping process waits for.
///
/// Any subsystem can mint its own channel, conventionally from the
/// address of the object guarding the awaited condition; equality of
/// tokens is all that sleep and wakeup ever compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel(usize);

impl Channel {
    /// Channel of an arbitrary kernel object, keyed by its address.
    pub fn of<T>(object: &T) -> Self {
        Self(object as *const T as usize)
    }

    /// Wait channel of a parent in `wait`, keyed by its table slot.
    ///
    /// Slot indices sit below any mapped kernel address, so these never
    /// collide with [`Channel::of`] tokens.
    pub fn child_exit(slot: usize) -> Self {
        Self(slot)
    }
}

const STACK_BYTES: usize =
    KERNEL_STACK_SIZE - core::mem::size_of::<Context>() - core::mem::size_of::<TrapFrame>();

/// A process's kernel stack.
///
/// The saved context and the trap frame live at fixed offsets at the
/// top of the allocation; the usable stack grows down from just below
/// the context.
#[repr(C, align(4096))]
pub struct KernelStack {
    stack: [u8; STACK_BYTES],
    context: Context,
    trapframe: TrapFrame,
}

impl KernelStack {
    pub fn new() -> Box<KernelStack> {
        Box::new(KernelStack {
            stack: [0; STACK_BYTES],
            context: Context::zeroed(),
            trapframe: TrapFrame::zeroed(),
        })
    }

    /// Initial stack pointer for a fresh process.
    pub fn top(&self) -> usize {
        &self.context as *const Context as usize
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn context_ptr(&mut self) -> *mut Context {
        &mut self.context
    }

    pub fn trapframe(&self) -> &TrapFrame {
        &self.trapframe
    }

    pub fn trapframe_mut(&mut self) -> &mut TrapFrame {
        &mut self.trapframe
    }

    pub fn trapframe_ptr(&mut self) -> *mut TrapFrame {
        &mut self.trapframe
    }
}

/// One slot of the process table.
pub struct Proc {
    pub state: ProcState,
    pub pid: Pid,
    /// Scheduling priority, 0 (low) or 1 (high).
    pub priority: u8,
    /// Bitmask of cores allowed to run this process.
    pub affinity: usize,
    /// Bytes of mapped user address space.
    pub size: usize,
    pub page_table: Option<UserPageTable>,
    pub kstack: Option<Box<KernelStack>>,
    /// Slot index of the parent, if any.
    pub parent: Option<usize>,
    pub files: [Option<Arc<File>>; NOFILE],
    pub cwd: Option<Arc<Inode>>,
    /// Valid only while `Sleeping`.
    pub channel: Option<Channel>,
    pub killed: bool,
}

impl Proc {
    fn unused() -> Self {
        Self {
            state: ProcState::Unused,
            pid: Pid(0),
            priority: 0,
            affinity: ALL_CPUS,
            size: 0,
            page_table: None,
            kstack: None,
            parent: None,
            files: core::array::from_fn(|_| None),
            cwd: None,
            channel: None,
            killed: false,
        }
    }

    /// Reset every field to the `Unused` defaults. The page table must
    /// already have been torn down through its allocator.
    pub fn reset(&mut self) {
        debug_assert!(self.page_table.is_none(), "reset with live address space");
        *self = Proc::unused();
    }
}

pub struct TableInner {
    pub procs: [Proc; MAX_PROCESSES],
    /// Slot of the first user process, adoptive parent of orphans.
    pub init_slot: Option<usize>,
    next_pid: u32,
}

impl TableInner {
    pub fn new() -> Self {
        Self {
            procs: core::array::from_fn(|_| Proc::unused()),
            init_slot: None,
            next_pid: 1,
        }
    }

    /// Claim a free slot and prepare it as an embryo: fresh pid, kernel
    /// stack carved with a context that resumes in the fork-return
    /// path, default priority and affinity.
    ///
    /// Returns `None` when the table is full.
    pub fn alloc(&mut self) -> Option<usize> {
        let slot = self
            .procs
            .iter()
            .position(|p| p.state == ProcState::Unused)?;
        let pid = Pid(self.next_pid);
        self.next_pid += 1;

        let mut kstack = KernelStack::new();
        let top = kstack.top();
        let context = kstack.context_mut();
        context.sp = top as u64;
        context.lr = scheduler::fork_ret as usize as u64;

        let p = &mut self.procs[slot];
        p.state = ProcState::Embryo;
        p.pid = pid;
        p.priority = 0;
        p.affinity = ALL_CPUS;
        p.kstack = Some(kstack);
        Some(slot)
    }

    /// Mutable access to two distinct slots at once.
    pub fn two_mut(&mut self, a: usize, b: usize) -> (&mut Proc, &mut Proc) {
        assert!(a != b, "two_mut of the same slot");
        if a < b {
            let (lo, hi) = self.procs.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.procs.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }
}

impl Default for TableInner {
    fn default() -> Self {
        Self::new()
    }
}

/// The table plus its one big lock.
pub struct ProcessTable {
    lock: SpinLock<TableInner>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            lock: SpinLock::new("ptable", TableInner::new()),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, TableInner> {
        self.lock.lock()
    }

    pub fn lock_ref(&self) -> &SpinLock<TableInner> {
        &self.lock
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref PROCESS_TABLE: ProcessTable = ProcessTable::new();
}

/// The global process table.
pub fn process_table() -> &'static ProcessTable {
    &PROCESS_TABLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PAGE_SIZE;

    #[test]
    fn alloc_prepares_an_embryo() {
        let mut inner = TableInner::new();
        let slot = inner.alloc().unwrap();
        let p = &inner.procs[slot];
        assert_eq!(p.state, ProcState::Embryo);
        assert_eq!(p.pid, Pid(1));
        assert_eq!(p.priority, 0);
        assert_eq!(p.affinity, ALL_CPUS);
        let kstack = p.kstack.as_ref().unwrap();
        assert_eq!(kstack.context().lr, scheduler::fork_ret as usize as u64);
        assert_eq!(kstack.context().sp, kstack.top() as u64);
        // The initial stack pointer sits inside the stack allocation.
        let base = kstack.as_ref() as *const KernelStack as usize;
        assert!(kstack.top() > base && kstack.top() < base + PAGE_SIZE);
    }

    #[test]
    fn pids_are_unique_across_slot_reuse() {
        let mut inner = TableInner::new();
        let slot = inner.alloc().unwrap();
        let first = inner.procs[slot].pid;
        inner.procs[slot].reset();
        let slot2 = inner.alloc().unwrap();
        assert_eq!(slot, slot2);
        assert_ne!(inner.procs[slot2].pid, first);
    }

    #[test]
    fn alloc_fails_when_full() {
        let mut inner = TableInner::new();
        for _ in 0..MAX_PROCESSES {
            assert!(inner.alloc().is_some());
        }
        assert_eq!(inner.alloc(), None);
    }

    #[test]
    fn two_mut_returns_distinct_slots() {
        let mut inner = TableInner::new();
        let a = inner.alloc().unwrap();
        let b = inner.alloc().unwrap();
        let (pa, pb) = inner.two_mut(a, b);
        pa.priority = 1;
        pb.priority = 0;
        assert!(!core::ptr::eq(pa, pb));
        let (pb2, pa2) = inner.two_mut(b, a);
        assert_eq!(pa2.priority, 1);
        assert_eq!(pb2.priority, 0);
    }

    #[test]
    fn kernel_stack_layout() {
        assert_eq!(core::mem::size_of::<KernelStack>(), KERNEL_STACK_SIZE);
        let ks = KernelStack::new();
        let base = ks.as_ref() as *const KernelStack as usize;
        // Trap frame at the very top, context right below it.
        assert_eq!(
            ks.trapframe() as *const _ as usize + core::mem::size_of::<TrapFrame>(),
            base + KERNEL_STACK_SIZE
        );
        assert_eq!(
            ks.context() as *const _ as usize + core::mem::size_of::<Context>(),
            ks.trapframe() as *const _ as usize
        );
    }
}
