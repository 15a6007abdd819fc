//! Heartbeat — blinks the status LED so a hung loop is visible
//!
//! Author: Moroya Sakamoto

use crate::condition::{Condition, Step};
use crate::message::Message;
use crate::task::{Context, Routine, TaskFault};

use super::StatusIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Half period of the blink
    pub interval_ms: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

pub struct HeartbeatTask<S: StatusIndicator> {
    led: S,
    config: HeartbeatConfig,
    on: Option<bool>,
}

impl<S: StatusIndicator> HeartbeatTask<S> {
    pub fn new(led: S, config: HeartbeatConfig) -> Self {
        Self { led, config, on: None }
    }

    pub fn led(&self) -> &S {
        &self.led
    }
}

impl<S: StatusIndicator> Routine for HeartbeatTask<S> {
    fn resume(&mut self, _: &Context<'_>, _: Option<Message>) -> Result<Step, TaskFault> {
        // first run turns the LED on, every later run toggles it
        let on = self.on.map_or(true, |on| !on);
        self.led.set(on);
        self.on = Some(on);
        Ok(Condition::sleep(self.config.interval_ms).into())
    }
}
