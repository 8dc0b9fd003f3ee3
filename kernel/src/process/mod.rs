//! Processes: table, per-core state, scheduling, and lifecycle.

pub mod cpu;
pub mod lifecycle;
pub mod scheduler;
pub mod table;

pub use lifecycle::{dump, exit_current, first_user_process, fork, grow_current, kill, wait};
pub use scheduler::{on_timer_tick, sleep, wakeup, yield_now};
pub use table::{process_table, Channel, Pid, Proc, ProcState, ProcessTable, TableInner};
