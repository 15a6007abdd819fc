//! Task definition — resumable routine plus scheduling metadata
//!
//! A routine is an explicit state object: each call to
//! [`Routine::resume`] runs the body up to its next yield point and
//! returns the [`Condition`] for the next wake-up. Progress between
//! resumptions lives in the routine's own fields.
//!
//! Author: Moroya Sakamoto

use core::fmt;

use crate::condition::{Condition, Step, Wake};
use crate::mailbox::Mailbox;
use crate::message::{Message, TaskId};
use crate::stats::Health;
use crate::tick::{Tick, TickClock, MAX_SLEEP_MS};

/// Maximum tasks the scheduler can manage
pub const MAX_TASKS: usize = 16;

/// Task execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Due on the next scan
    Ready,
    /// Currently executing
    Running,
    /// Waiting for its sleep to elapse
    Sleeping,
    /// Waiting for a message (optionally with a timeout)
    Waiting,
    /// Routine completed; never dispatched again
    Terminated,
}

/// Error raised by a routine while it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFault {
    /// Received a message it cannot interpret
    BadMessage(&'static str),
    /// A collaborator device failed and the routine gave up on this cycle
    Device(&'static str),
    /// The routine panicked (caught at the dispatch boundary)
    Panicked,
}

impl fmt::Display for TaskFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFault::BadMessage(why) => write!(f, "bad message: {}", why),
            TaskFault::Device(why) => write!(f, "device error: {}", why),
            TaskFault::Panicked => write!(f, "panicked"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for TaskFault {}

/// What a task can see while it runs
pub struct Context<'c> {
    pub(crate) id: TaskId,
    pub(crate) name: &'static str,
    pub(crate) clock: &'c dyn TickClock,
    pub(crate) health: Health,
}

impl<'c> Context<'c> {
    /// Id of the running task
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Name of the running task
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current tick, read live from the scheduler clock
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    /// Scheduler health snapshot taken just before this dispatch
    pub fn health(&self) -> &Health {
        &self.health
    }
}

/// Resumable task body
pub trait Routine {
    /// Run to the next yield point
    ///
    /// `message` is the oldest pending inbox message, if any. Returning
    /// `Err` is a contained fault: the task is rescheduled, not retired.
    fn resume(&mut self, ctx: &Context<'_>, message: Option<Message>) -> Result<Step, TaskFault>;
}

impl<F> Routine for F
where
    F: FnMut(&Context<'_>, Option<Message>) -> Result<Step, TaskFault>,
{
    fn resume(&mut self, ctx: &Context<'_>, message: Option<Message>) -> Result<Step, TaskFault> {
        self(ctx, message)
    }
}

/// Per-task counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    /// Successful and faulted resumptions
    pub dispatches: u32,
    /// Resumptions that ended in a fault
    pub faults: u32,
    /// Wait-for-message resumptions that fired on timeout
    pub timeouts: u32,
    /// Outgoing messages dropped for an invalid receiver
    pub undeliverable: u32,
}

/// Registration request: a name and the routine to drive
pub struct TaskSpec<'a> {
    pub name: &'static str,
    pub routine: &'a mut dyn Routine,
}

impl<'a> TaskSpec<'a> {
    pub fn new(name: &'static str, routine: &'a mut dyn Routine) -> Self {
        Self { name, routine }
    }
}

/// Registered task
pub struct Task<'a> {
    id: TaskId,
    name: &'static str,
    pub(crate) routine: &'a mut dyn Routine,
    state: TaskState,
    /// Absolute wake tick; `None` while waiting for a message without timeout
    due: Option<Tick>,
    waiting_for_message: bool,
    pub(crate) mailbox: Mailbox,
    last_wake: Option<Wake>,
    pub(crate) stats: TaskStats,
}

impl<'a> Task<'a> {
    pub(crate) fn new(id: TaskId, spec: TaskSpec<'a>) -> Self {
        Self {
            id,
            name: spec.name,
            routine: spec.routine,
            state: TaskState::Ready,
            due: None,
            waiting_for_message: false,
            mailbox: Mailbox::new(),
            last_wake: None,
            stats: TaskStats::default(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == TaskState::Terminated
    }

    pub fn is_waiting_for_message(&self) -> bool {
        self.waiting_for_message
    }

    /// Absolute wake tick, if bounded by time
    pub fn due(&self) -> Option<Tick> {
        self.due
    }

    /// Pending inbox messages
    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }

    /// Inbox messages lost to overflow
    pub fn dropped(&self) -> u32 {
        self.mailbox.dropped()
    }

    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    /// Last successfully applied wake criterion
    pub fn last_wake(&self) -> Option<Wake> {
        self.last_wake
    }

    /// Should this task be resumed at `now`?
    ///
    /// A pending message wins over an elapsed timeout; both make the task
    /// due, and the message is what gets delivered.
    pub fn is_due(&self, now: Tick) -> bool {
        let time_up = self.due.is_some_and(|due| now.reached(due));
        match self.state {
            TaskState::Ready => true,
            TaskState::Sleeping => time_up,
            TaskState::Waiting => !self.mailbox.is_empty() || time_up,
            TaskState::Running | TaskState::Terminated => false,
        }
    }

    pub(crate) fn begin(&mut self) {
        self.state = TaskState::Running;
        self.stats.dispatches = self.stats.dispatches.saturating_add(1);
    }

    /// Install a wake criterion measured from `now`
    ///
    /// The delay is capped at [`MAX_SLEEP_MS`]; a longer one would wrap to a
    /// due tick in the past.
    pub(crate) fn apply(&mut self, wake: Wake, now: Tick) {
        let sleep_ms = wake.sleep_ms.min(MAX_SLEEP_MS);
        self.waiting_for_message = wake.wait_msg;
        self.due = if wake.has_timeout() {
            Some(now.add_ms(sleep_ms as i32))
        } else {
            None
        };
        self.state = if wake.wait_msg {
            TaskState::Waiting
        } else if sleep_ms == 0 {
            TaskState::Ready
        } else {
            TaskState::Sleeping
        };
    }

    /// Record a successful yield and install its wake criterion
    pub(crate) fn settle(&mut self, condition: &Condition, now: Tick) {
        let wake = condition.wake();
        self.last_wake = Some(wake);
        self.apply(wake, now);
    }

    /// Reschedule after a fault: last good criterion, else `backoff_ms` sleep
    pub(crate) fn recover(&mut self, backoff_ms: u32, now: Tick) {
        self.stats.faults = self.stats.faults.saturating_add(1);
        let wake = self.last_wake.unwrap_or(Wake {
            sleep_ms: backoff_ms,
            wait_msg: false,
        });
        self.apply(wake, now);
    }

    pub(crate) fn terminate(&mut self) {
        self.state = TaskState::Terminated;
        self.waiting_for_message = false;
        self.due = None;
        self.mailbox.clear();
    }
}
