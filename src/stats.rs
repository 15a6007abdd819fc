//! CPU and memory accounting
//!
//! The idle ratio is the share of scan cycles in which no task was due,
//! measured over a fixed window of cycles. Memory figures come from a
//! [`MemoryProbe`] supplied by the board; the scheduler only forwards them.
//!
//! Author: Moroya Sakamoto

/// Heap/RAM query supplied by the host runtime
pub trait MemoryProbe {
    /// Bytes currently free
    fn free_bytes(&self) -> usize;

    /// Bytes managed in total (0 if unknown)
    fn total_bytes(&self) -> usize;

    /// Reclaim whatever the runtime can before measuring (startup only)
    fn reclaim(&self) {}
}

/// Probe for targets without a heap: reports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl MemoryProbe for Unmetered {
    fn free_bytes(&self) -> usize {
        0
    }

    fn total_bytes(&self) -> usize {
        0
    }
}

/// Probe reporting fixed figures (static pools, host simulation)
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    pub free: usize,
    pub total: usize,
}

impl MemoryProbe for FixedProbe {
    fn free_bytes(&self) -> usize {
        self.free
    }

    fn total_bytes(&self) -> usize {
        self.total
    }
}

/// Snapshot handed to each task at dispatch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    /// Logical processor the scheduler is bound to
    pub cpu_id: u8,
    /// Idle cycles over the last window, percent
    pub idle_percent: f32,
    pub free_memory: usize,
    pub total_memory: usize,
}

impl Health {
    /// Busy share, percent (0–100)
    pub fn cpu_percent(&self) -> u8 {
        (100.0 - self.idle_percent).clamp(0.0, 100.0) as u8
    }

    /// Used memory, percent (0 when the total is unknown)
    pub fn memory_percent(&self) -> u8 {
        if self.total_memory == 0 {
            return 0;
        }
        let used = self.total_memory.saturating_sub(self.free_memory);
        ((used as u64 * 100) / self.total_memory as u64) as u8
    }
}

/// Windowed idle-cycle counter
#[derive(Debug, Clone)]
pub struct IdleMeter {
    window: u32,
    cycles: u32,
    idle: u32,
    last_percent: Option<f32>,
    total_cycles: u64,
    total_idle: u64,
}

impl IdleMeter {
    /// Meter publishing a new ratio every `window` cycles
    pub const fn new(window: u32) -> Self {
        Self {
            window: if window == 0 { 1 } else { window },
            cycles: 0,
            idle: 0,
            last_percent: None,
            total_cycles: 0,
            total_idle: 0,
        }
    }

    /// Record one scan cycle
    pub fn record(&mut self, idle: bool) {
        self.cycles += 1;
        self.total_cycles += 1;
        if idle {
            self.idle += 1;
            self.total_idle += 1;
        }
        if self.cycles >= self.window {
            self.last_percent = Some(self.idle as f32 * 100.0 / self.cycles as f32);
            self.cycles = 0;
            self.idle = 0;
        }
    }

    /// Idle percentage over the last complete window
    ///
    /// Before the first window completes, the partial window is used.
    pub fn ratio(&self) -> f32 {
        match self.last_percent {
            Some(p) => p,
            None if self.cycles == 0 => 0.0,
            None => self.idle as f32 * 100.0 / self.cycles as f32,
        }
    }

    /// Cycles recorded since creation
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Idle cycles recorded since creation
    pub fn total_idle(&self) -> u64 {
        self.total_idle
    }
}
