//! Condition — what a task hands back at every yield
//!
//! | sleep_ms | wait_msg | redispatched when                         |
//! |----------|----------|-------------------------------------------|
//! | 0        | false    | next time the scan reaches it             |
//! | N        | false    | N ms have elapsed                         |
//! | 0        | true     | a message arrives                         |
//! | N        | true     | a message arrives or N ms elapse (first)  |
//!
//! Author: Moroya Sakamoto

use heapless::Vec;

use crate::message::{Content, TaskId};
use crate::tick::MAX_SLEEP_MS;

/// Messages one condition can carry
pub const MAX_OUTGOING: usize = 4;

/// A message on its way out, before the scheduler stamps the sender
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub receiver: TaskId,
    pub content: Content,
}

/// Wake criterion without the outgoing messages
///
/// Remembered per task so a faulted resumption can be rescheduled the way
/// the last good one was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wake {
    pub sleep_ms: u32,
    pub wait_msg: bool,
}

impl Wake {
    /// Redispatch is bounded by time
    pub fn has_timeout(&self) -> bool {
        !self.wait_msg || self.sleep_ms > 0
    }
}

/// Yield directive returned by a task
#[derive(Debug, Clone)]
pub struct Condition {
    sleep_ms: u32,
    wait_msg: bool,
    send_msgs: Vec<Outgoing, MAX_OUTGOING>,
}

impl Condition {
    /// Yield without delay
    pub fn yield_now() -> Self {
        Self::sleep(0)
    }

    /// Sleep for `ms` milliseconds
    pub fn sleep(ms: u32) -> Self {
        Self {
            sleep_ms: clamp_sleep(ms),
            wait_msg: false,
            send_msgs: Vec::new(),
        }
    }

    /// Wait for a message with no timeout
    pub fn wait_message() -> Self {
        Self::wait_message_for(0)
    }

    /// Wait for a message, giving up after `timeout_ms` (0 = never)
    pub fn wait_message_for(timeout_ms: u32) -> Self {
        Self {
            sleep_ms: clamp_sleep(timeout_ms),
            wait_msg: true,
            send_msgs: Vec::new(),
        }
    }

    /// Attach an outgoing message
    ///
    /// Messages past [`MAX_OUTGOING`] are dropped with a warning.
    pub fn send(mut self, receiver: TaskId, content: Content) -> Self {
        if self.send_msgs.push(Outgoing { receiver, content }).is_err() {
            log::warn!("condition outbox full, dropped message to {}", receiver);
        }
        self
    }

    pub fn sleep_ms(&self) -> u32 {
        self.sleep_ms
    }

    pub fn wait_msg(&self) -> bool {
        self.wait_msg
    }

    pub fn outgoing(&self) -> &[Outgoing] {
        &self.send_msgs
    }

    /// Wake criterion of this condition
    pub fn wake(&self) -> Wake {
        Wake {
            sleep_ms: self.sleep_ms,
            wait_msg: self.wait_msg,
        }
    }

    /// Split into the wake criterion and the outgoing messages
    pub fn into_parts(self) -> (Wake, Vec<Outgoing, MAX_OUTGOING>) {
        (
            Wake {
                sleep_ms: self.sleep_ms,
                wait_msg: self.wait_msg,
            },
            self.send_msgs,
        )
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::yield_now()
    }
}

fn clamp_sleep(ms: u32) -> u32 {
    if ms > MAX_SLEEP_MS {
        log::warn!("sleep of {} ms clamped to {} ms", ms, MAX_SLEEP_MS);
        MAX_SLEEP_MS
    } else {
        ms
    }
}

/// Result of one resumption of a task routine
#[derive(Debug, Clone)]
pub enum Step {
    /// Suspended; resume according to the condition
    Yield(Condition),
    /// Routine finished; the task is retired
    Complete,
}

impl From<Condition> for Step {
    fn from(c: Condition) -> Self {
        Step::Yield(c)
    }
}
