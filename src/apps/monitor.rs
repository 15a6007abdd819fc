//! Health monitor — periodic CPU/RAM status line for the display task
//!
//! Author: Moroya Sakamoto

use core::fmt::Write;

use crate::condition::{Condition, Step};
use crate::message::{Content, Message, TaskId, Value, TEXT_CAPACITY};
use crate::task::{Context, Routine, TaskFault};

use super::display::TEXT_KEY;

/// Monitor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Report period
    pub interval_ms: u32,
    /// Task receiving the status line
    pub display: TaskId,
}

impl MonitorConfig {
    pub const fn new(display: TaskId) -> Self {
        Self {
            interval_ms: 2000,
            display,
        }
    }

    pub const fn with_interval_ms(mut self, ms: u32) -> Self {
        self.interval_ms = ms;
        self
    }
}

pub struct MonitorTask {
    config: MonitorConfig,
}

impl MonitorTask {
    pub fn new(config: MonitorConfig) -> Self {
        Self { config }
    }
}

/// `"CPU0: 12%  RAM: 34%"`
fn status_line(ctx: &Context<'_>) -> heapless::String<TEXT_CAPACITY> {
    let health = ctx.health();
    let mut line = heapless::String::new();
    // Longest line is 19 bytes, well inside TEXT_CAPACITY
    let _ = write!(
        line,
        "CPU{}:{:3}%  RAM:{:3}%",
        health.cpu_id,
        health.cpu_percent(),
        health.memory_percent()
    );
    line
}

impl Routine for MonitorTask {
    fn resume(&mut self, ctx: &Context<'_>, _: Option<Message>) -> Result<Step, TaskFault> {
        let line = status_line(ctx);
        log::debug!("{}", line);
        Ok(Condition::sleep(self.config.interval_ms)
            .send(self.config.display, Content::new().with(TEXT_KEY, Value::Text(line)))
            .into())
    }
}
