//! Tick clock — wraparound-safe millisecond time
//!
//! Ticks count milliseconds modulo 2^29 and wrap instead of overflowing.
//! Never compare two ticks with `<` or subtract them directly: use
//! [`diff`], which returns the signed distance and stays correct across
//! the wrap boundary for any two ticks less than half a period apart.
//!
//! Author: Moroya Sakamoto

/// Tick counter period (2^29 ms ≈ 6.2 days)
pub const TICKS_PERIOD: u32 = 1 << 29;
/// Largest representable tick value
pub const TICKS_MAX: u32 = TICKS_PERIOD - 1;
/// Half a period — the widest distance [`diff`] can resolve
pub const TICKS_HALF: u32 = TICKS_PERIOD / 2;
/// Longest sleep a task may request
pub const MAX_SLEEP_MS: u32 = TICKS_HALF - 1;

/// Millisecond tick, always in `0..TICKS_PERIOD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    /// Tick zero
    pub const ZERO: Tick = Tick(0);

    /// Build a tick from a raw millisecond counter (any width), folding it
    /// into the tick period.
    pub const fn from_ms(ms: u64) -> Self {
        Tick((ms & TICKS_MAX as u64) as u32)
    }

    /// Raw tick value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Tick `delta_ms` after (or before, if negative) this one
    pub const fn add_ms(self, delta_ms: i32) -> Tick {
        Tick(self.0.wrapping_add(delta_ms as u32) & TICKS_MAX)
    }

    /// Signed milliseconds elapsed from `earlier` to `self`
    pub const fn since(self, earlier: Tick) -> i32 {
        let shifted = self.0.wrapping_sub(earlier.0).wrapping_add(TICKS_HALF) & TICKS_MAX;
        shifted as i32 - TICKS_HALF as i32
    }

    /// Has `self` reached or passed `deadline`?
    pub const fn reached(self, deadline: Tick) -> bool {
        self.since(deadline) >= 0
    }
}

/// `t + delta_ms`, wrapped into the tick period
///
/// Valid for `|delta_ms| < TICKS_HALF`; larger deltas still wrap but no
/// longer round-trip through [`diff`].
pub const fn add(t: Tick, delta_ms: i32) -> Tick {
    t.add_ms(delta_ms)
}

/// Signed time elapsed from `b` to `a`: `diff(add(t, d), t) == d`
pub const fn diff(a: Tick, b: Tick) -> i32 {
    a.since(b)
}

/// Millisecond time source
///
/// Tasks reach time only through this trait (via their dispatch context),
/// never through a wall clock.
pub trait TickClock {
    /// Current tick
    fn now(&self) -> Tick;
}

/// Software clock, advanced by hand
///
/// Used by tests and by the kernel's deterministic simulation.
#[derive(Debug, Clone, Default)]
pub struct SoftClock {
    now: Tick,
}

impl SoftClock {
    /// Clock starting at tick zero
    pub const fn new() -> Self {
        Self { now: Tick::ZERO }
    }

    /// Clock starting at an arbitrary tick (wraparound tests)
    pub const fn starting_at(start: Tick) -> Self {
        Self { now: start }
    }

    /// Advance time by `ms` milliseconds
    pub fn advance(&mut self, ms: u32) {
        self.now = Tick(self.now.0.wrapping_add(ms) & TICKS_MAX);
    }

    /// Jump to an absolute tick
    pub fn set(&mut self, now: Tick) {
        self.now = now;
    }
}

impl TickClock for SoftClock {
    fn now(&self) -> Tick {
        self.now
    }
}

/// Clock backed by a HAL millisecond counter
///
/// `FnClock(|| hal_timer_millis())` — the counter may be any width; it is
/// folded into the tick period on every read.
#[derive(Clone, Copy)]
pub struct FnClock(pub fn() -> u64);

impl TickClock for FnClock {
    fn now(&self) -> Tick {
        Tick::from_ms((self.0)())
    }
}

/// Host clock measuring from its own creation
#[cfg(feature = "std")]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self { origin: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TickClock for StdClock {
    fn now(&self) -> Tick {
        Tick::from_ms(self.origin.elapsed().as_millis() as u64)
    }
}
