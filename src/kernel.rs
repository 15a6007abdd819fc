//! Kernel — top-level firmware manager
//!
//! Owns the scheduler and the idle strategy, and performs the one-time
//! startup step before the scan loop begins. Entry point for ALICE-Coop
//! usage:
//!
//! ```ignore
//! let mut kernel = Kernel::new(Scheduler::new(SchedulerConfig::new(), FnClock(millis)), WaitForInterrupt);
//! kernel.add_task("display", &mut display)?;
//! kernel.add_task("monitor", &mut monitor)?;
//! kernel.run()?;
//! ```
//!
//! Author: Moroya Sakamoto

use core::convert::Infallible;

use log::info;

use crate::message::TaskId;
use crate::scheduler::{Scheduler, SchedulerError};
use crate::task::Routine;
use crate::tick::{SoftClock, TickClock};

/// What the kernel does with a scan cycle in which nothing was due
pub trait IdleStrategy {
    fn idle(&mut self);
}

/// Busy-poll: rescan immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct Spin;

impl IdleStrategy for Spin {
    fn idle(&mut self) {
        core::hint::spin_loop();
    }
}

/// Sleep the core until the next interrupt
///
/// Needs a periodic tick interrupt (or any other wake source) on the board,
/// otherwise the next due task is reached only at the next unrelated IRQ.
/// On targets without `wfi` support it yields the host thread or spins.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitForInterrupt;

impl IdleStrategy for WaitForInterrupt {
    fn idle(&mut self) {
        #[cfg(all(feature = "cortex-m", target_arch = "arm"))]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }

        #[cfg(all(feature = "riscv", any(target_arch = "riscv32", target_arch = "riscv64")))]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }

        #[cfg(not(any(
            all(feature = "cortex-m", target_arch = "arm"),
            all(feature = "riscv", any(target_arch = "riscv32", target_arch = "riscv64"))
        )))]
        fallback_idle();
    }
}

#[cfg(feature = "std")]
#[allow(dead_code)]
fn fallback_idle() {
    std::thread::yield_now();
}

#[cfg(not(feature = "std"))]
#[allow(dead_code)]
fn fallback_idle() {
    core::hint::spin_loop();
}

/// ALICE-Coop Kernel
pub struct Kernel<'a, C: TickClock, I: IdleStrategy = Spin> {
    /// Task scheduler
    pub scheduler: Scheduler<'a, C>,
    idle: I,
    booted: bool,
}

impl<'a, C: TickClock, I: IdleStrategy> Kernel<'a, C, I> {
    pub fn new(scheduler: Scheduler<'a, C>, idle: I) -> Self {
        Self {
            scheduler,
            idle,
            booted: false,
        }
    }

    /// Register a task before boot
    pub fn add_task(
        &mut self,
        name: &'static str,
        routine: &'a mut dyn Routine,
    ) -> Result<TaskId, SchedulerError> {
        self.scheduler.spawn(name, routine)
    }

    /// One-time startup step
    ///
    /// Reclaims memory, logs the task table and seals the registry.
    pub fn boot(&mut self) -> Result<(), SchedulerError> {
        if self.booted {
            return Err(SchedulerError::AlreadyBooted);
        }
        self.scheduler.reclaim_memory();
        for task in self.scheduler.tasks() {
            info!("task {} {:?}", task.id(), task.name());
        }
        self.scheduler.seal();
        self.booted = true;
        info!(
            "kernel booted: cpu{}, {} tasks, {} bytes free",
            self.scheduler.cpu_id(),
            self.scheduler.tasks().len(),
            self.scheduler.free_memory()
        );
        Ok(())
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Run one scan cycle, idling if nothing was due
    pub fn tick(&mut self) -> Result<usize, SchedulerError> {
        let dispatched = self.scheduler.step()?;
        if dispatched == 0 {
            self.idle.idle();
        }
        Ok(dispatched)
    }

    /// Boot if needed, then scan forever
    ///
    /// Returns only on a scheduler-internal fault; the caller should reset.
    pub fn run(&mut self) -> Result<Infallible, SchedulerError> {
        if !self.booted {
            self.boot()?;
        }
        loop {
            self.tick()?;
        }
    }

    /// Sum of routine faults across all tasks
    pub fn total_faults(&self) -> u64 {
        self.scheduler
            .tasks()
            .iter()
            .map(|t| t.stats().faults as u64)
            .sum()
    }

    /// Memory footprint estimate
    pub fn memory_footprint(&self) -> usize {
        core::mem::size_of::<Self>()
    }
}

impl<'a, I: IdleStrategy> Kernel<'a, SoftClock, I> {
    /// Simulate `total_ms` of run time in `step_ms` increments
    ///
    /// Scans once at the current tick, then advances the clock and scans
    /// again until `total_ms` has elapsed.
    pub fn run_for(&mut self, total_ms: u32, step_ms: u32) -> Result<KernelStats, SchedulerError> {
        if !self.booted {
            self.boot()?;
        }
        let step_ms = step_ms.max(1);
        let start_cycles = self.scheduler.cycles();
        let start_faults = self.total_faults();
        let mut elapsed = 0u32;
        let mut dispatches = 0u64;

        loop {
            dispatches += self.tick()? as u64;
            if elapsed >= total_ms {
                break;
            }
            let advance = step_ms.min(total_ms - elapsed);
            self.scheduler.clock_mut().advance(advance);
            elapsed += advance;
        }

        Ok(KernelStats {
            elapsed_ms: elapsed,
            cycles: self.scheduler.cycles() - start_cycles,
            dispatches,
            faults: self.total_faults() - start_faults,
            idle_percent: self.scheduler.idle_ratio(),
        })
    }
}

/// Kernel execution statistics
#[derive(Debug, Clone)]
pub struct KernelStats {
    /// Simulated time (ms)
    pub elapsed_ms: u32,
    /// Scan cycles run
    pub cycles: u64,
    /// Task resumptions
    pub dispatches: u64,
    /// Routine faults contained
    pub faults: u64,
    /// Idle ratio at the end of the run
    pub idle_percent: f32,
}
