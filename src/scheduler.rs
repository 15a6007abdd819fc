//! Cooperative round-robin scheduler
//!
//! Every scan cycle visits the registered tasks in registration order.
//! A due task is resumed with at most one message from its inbox, runs to
//! its next yield, and the returned condition is applied before the scan
//! moves on: the next wake-up is computed and outgoing messages are
//! delivered. No priorities, no preemption; a task that never yields
//! stalls everything.
//!
//! Routine faults are contained here. A faulted task is rescheduled from
//! its last good wake criterion (or a fixed backoff) and keeps running.
//! Only registry corruption escapes as [`SchedulerError`].
//!
//! Author: Moroya Sakamoto

use core::convert::Infallible;
use core::fmt;

use heapless::Vec;
use log::{error, info, trace, warn};

use crate::condition::Step;
use crate::inbox::ExternalInbox;
use crate::message::{Message, TaskId};
use crate::stats::{Health, IdleMeter, MemoryProbe, Unmetered};
use crate::task::{Context, Routine, Task, TaskFault, TaskSpec, TaskState, MAX_TASKS};
use crate::tick::{Tick, TickClock, MAX_SLEEP_MS};

/// Scheduler settings, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Logical processor this instance is bound to
    pub cpu_id: u8,
    /// Sleep applied to a task that faults before it ever yielded
    pub fault_backoff_ms: u32,
    /// Scan cycles per idle-ratio window
    pub idle_window: u32,
    /// Reject a second task with an existing name
    pub unique_names: bool,
}

impl SchedulerConfig {
    pub const fn new() -> Self {
        Self {
            cpu_id: 0,
            fault_backoff_ms: 1000,
            idle_window: 1000,
            unique_names: true,
        }
    }

    pub const fn with_cpu_id(mut self, cpu_id: u8) -> Self {
        self.cpu_id = cpu_id;
        self
    }

    /// Capped at [`MAX_SLEEP_MS`]
    pub const fn with_fault_backoff_ms(mut self, ms: u32) -> Self {
        self.fault_backoff_ms = if ms > MAX_SLEEP_MS { MAX_SLEEP_MS } else { ms };
        self
    }

    pub const fn with_idle_window(mut self, cycles: u32) -> Self {
        self.idle_window = cycles;
        self
    }

    pub const fn with_unique_names(mut self, unique: bool) -> Self {
        self.unique_names = unique;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Unrecoverable scheduler errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// All [`MAX_TASKS`] slots are taken
    RegistryFull,
    /// A task with this name is already registered
    DuplicateName(&'static str),
    /// The registry is sealed once scheduling has started
    Sealed,
    /// The kernel startup step ran twice
    AlreadyBooted,
    /// A registry slot no longer matches its task id
    RegistryCorrupt(TaskId),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::RegistryFull => write!(f, "task registry full ({} slots)", MAX_TASKS),
            SchedulerError::DuplicateName(name) => write!(f, "duplicate task name {:?}", name),
            SchedulerError::Sealed => write!(f, "task registry sealed after start"),
            SchedulerError::AlreadyBooted => write!(f, "kernel already booted"),
            SchedulerError::RegistryCorrupt(id) => write!(f, "registry slot mismatch for task {}", id),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SchedulerError {}

/// Cooperative scheduler
///
/// Borrows its routines for `'a`; the registry is a fixed-capacity table.
pub struct Scheduler<'a, C: TickClock> {
    config: SchedulerConfig,
    tasks: Vec<Task<'a>, MAX_TASKS>,
    clock: C,
    memory: &'a dyn MemoryProbe,
    external: Option<&'a ExternalInbox>,
    idle: IdleMeter,
    cycle_counter: u64,
    sealed: bool,
}

impl<'a, C: TickClock> Scheduler<'a, C> {
    /// Create an empty scheduler
    pub fn new(config: SchedulerConfig, clock: C) -> Self {
        Self {
            config,
            tasks: Vec::new(),
            clock,
            memory: &Unmetered,
            external: None,
            idle: IdleMeter::new(config.idle_window),
            cycle_counter: 0,
            sealed: false,
        }
    }

    /// Use `probe` for memory accounting
    pub fn with_memory_probe(mut self, probe: &'a dyn MemoryProbe) -> Self {
        self.memory = probe;
        self
    }

    /// Drain `inbox` into task mailboxes at the start of every cycle
    pub fn attach_inbox(&mut self, inbox: &'a ExternalInbox) {
        self.external = Some(inbox);
    }

    /// Register a task; it is due on the first scan
    pub fn add_task(&mut self, spec: TaskSpec<'a>) -> Result<TaskId, SchedulerError> {
        if self.sealed {
            return Err(SchedulerError::Sealed);
        }
        if self.config.unique_names && self.find(spec.name).is_some() {
            return Err(SchedulerError::DuplicateName(spec.name));
        }
        let id = self.next_id().ok_or(SchedulerError::RegistryFull)?;
        let name = spec.name;
        self.tasks
            .push(Task::new(id, spec))
            .map_err(|_| SchedulerError::RegistryFull)?;
        info!("registered task {} {:?}", id, name);
        Ok(id)
    }

    /// Shorthand for `add_task(TaskSpec::new(name, routine))`
    pub fn spawn(
        &mut self,
        name: &'static str,
        routine: &'a mut dyn Routine,
    ) -> Result<TaskId, SchedulerError> {
        self.add_task(TaskSpec::new(name, routine))
    }

    /// Id the next registration will receive
    pub fn next_id(&self) -> Option<TaskId> {
        if self.tasks.is_full() {
            None
        } else {
            Some(TaskId(self.tasks.len() as u8))
        }
    }

    /// Freeze the registry
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Run one scan cycle; returns how many tasks were dispatched
    pub fn step(&mut self) -> Result<usize, SchedulerError> {
        self.sealed = true;
        self.cycle_counter += 1;
        self.drain_external();

        let mut dispatched = 0;
        for index in 0..self.tasks.len() {
            let now = self.clock.now();
            if self.tasks[index].is_due(now) {
                self.dispatch(index)?;
                dispatched += 1;
            }
        }
        self.idle.record(dispatched == 0);
        Ok(dispatched)
    }

    /// Scan forever
    ///
    /// Returns only on a scheduler-internal fault.
    pub fn run(&mut self) -> Result<Infallible, SchedulerError> {
        info!("scheduler running on cpu{} with {} tasks", self.config.cpu_id, self.tasks.len());
        loop {
            self.step()?;
        }
    }

    fn dispatch(&mut self, index: usize) -> Result<(), SchedulerError> {
        let health = self.health();
        let task = &mut self.tasks[index];
        if task.id().index() != index {
            return Err(SchedulerError::RegistryCorrupt(task.id()));
        }

        let was_waiting = task.state() == TaskState::Waiting;
        let message = task.mailbox.dequeue();
        if was_waiting && message.is_none() {
            task.stats.timeouts = task.stats.timeouts.saturating_add(1);
        }
        task.begin();
        trace!("dispatch {} {:?}", task.id(), task.name());

        let ctx = Context {
            id: task.id(),
            name: task.name(),
            clock: &self.clock,
            health,
        };
        let outcome = resume_contained(&mut *task.routine, &ctx, message);
        let now = self.clock.now();
        let sender = task.id();

        match outcome {
            Ok(Step::Yield(condition)) => {
                task.settle(&condition, now);
                let (_, outgoing) = condition.into_parts();
                for out in outgoing {
                    self.deliver(Message::new(out.content, sender, out.receiver));
                }
            }
            Ok(Step::Complete) => {
                info!("task {} {:?} completed", sender, task.name());
                task.terminate();
            }
            Err(fault) => {
                error!("task {} {:?} faulted: {}", sender, task.name(), fault);
                task.recover(self.config.fault_backoff_ms, now);
            }
        }
        Ok(())
    }

    fn deliver(&mut self, message: Message) {
        let sender = message.sender();
        let receiver = message.receiver();
        match self.tasks.get_mut(receiver.index()) {
            Some(task) if !task.is_terminated() => {
                let _ = task.mailbox.enqueue(message);
            }
            _ => {
                warn!("message from {} to unknown or finished task {} dropped", sender, receiver);
                if let Some(task) = self.tasks.get_mut(sender.index()) {
                    task.stats.undeliverable = task.stats.undeliverable.saturating_add(1);
                }
            }
        }
    }

    fn drain_external(&mut self) {
        if let Some(inbox) = self.external {
            while let Some(message) = inbox.take() {
                self.deliver(message);
            }
        }
    }

    /// Idle cycles over the last window, percent
    pub fn idle_ratio(&self) -> f32 {
        self.idle.ratio()
    }

    /// Free memory reported by the memory probe, bytes
    pub fn free_memory(&self) -> usize {
        self.memory.free_bytes()
    }

    /// Ask the memory probe to reclaim what it can
    pub fn reclaim_memory(&self) {
        self.memory.reclaim();
    }

    pub fn cpu_id(&self) -> u8 {
        self.config.cpu_id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Snapshot for monitoring consumers
    pub fn health(&self) -> Health {
        Health {
            cpu_id: self.config.cpu_id,
            idle_percent: self.idle.ratio(),
            free_memory: self.memory.free_bytes(),
            total_memory: self.memory.total_bytes(),
        }
    }

    /// Scan cycles run so far
    pub fn cycles(&self) -> u64 {
        self.cycle_counter
    }

    pub fn task(&self, id: TaskId) -> Option<&Task<'a>> {
        self.tasks.get(id.index())
    }

    pub fn tasks(&self) -> &[Task<'a>] {
        &self.tasks
    }

    /// Look a task up by name
    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.tasks.iter().find(|t| t.name() == name).map(Task::id)
    }

    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }
}

#[cfg(feature = "std")]
fn resume_contained(
    routine: &mut dyn Routine,
    ctx: &Context<'_>,
    message: Option<Message>,
) -> Result<Step, TaskFault> {
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| routine.resume(ctx, message)))
        .unwrap_or(Err(TaskFault::Panicked))
}

#[cfg(not(feature = "std"))]
fn resume_contained(
    routine: &mut dyn Routine,
    ctx: &Context<'_>,
    message: Option<Message>,
) -> Result<Step, TaskFault> {
    routine.resume(ctx, message)
}
