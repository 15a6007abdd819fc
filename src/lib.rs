//! ALICE-Coop — cooperative multitasking for single-core firmware
//!
//! Don't preempt duties, let them yield.
//!
//! Minimal scheduler for periodic, independent firmware duties
//! (matrix scan, status LED, health reporting, text display):
//! - Static task registry (no heap, fixed capacities)
//! - Round-robin scan in registration order, no priorities
//! - Per-task FIFO mailboxes with drop-oldest overflow
//! - Wraparound-safe millisecond ticks
//! - Routine faults contained at the dispatch boundary
//!
//! Author: Moroya Sakamoto

#![no_std]

#[cfg(feature = "std")]
extern crate std;

pub mod tick;
pub mod message;
pub mod mailbox;
pub mod condition;
pub mod task;
pub mod stats;
pub mod inbox;
pub mod scheduler;
pub mod kernel;
pub mod apps;

pub use tick::{SoftClock, FnClock, Tick, TickClock};
pub use message::{Content, Message, TaskId, Value};
pub use mailbox::Mailbox;
pub use condition::{Condition, Step};
pub use task::{Context, Routine, Task, TaskFault, TaskSpec, TaskState};
pub use stats::{Health, MemoryProbe};
pub use inbox::ExternalInbox;
pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
pub use kernel::{IdleStrategy, Kernel, Spin, WaitForInterrupt};
