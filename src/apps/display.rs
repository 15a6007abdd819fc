//! Display task — shows the `"msg"` text of every message it receives
//!
//! Author: Moroya Sakamoto

use crate::condition::{Condition, Step};
use crate::message::{Message, Value};
use crate::task::{Context, Routine, TaskFault};

use super::DisplaySink;

/// Content key carrying the text to show
pub const TEXT_KEY: &str = "msg";

pub struct DisplayTask<D: DisplaySink> {
    sink: D,
    shown: u32,
}

impl<D: DisplaySink> DisplayTask<D> {
    pub fn new(sink: D) -> Self {
        Self { sink, shown: 0 }
    }

    pub fn sink(&self) -> &D {
        &self.sink
    }

    /// Messages shown so far
    pub fn shown(&self) -> u32 {
        self.shown
    }
}

impl<D: DisplaySink> Routine for DisplayTask<D> {
    fn resume(&mut self, _: &Context<'_>, message: Option<Message>) -> Result<Step, TaskFault> {
        if let Some(message) = message {
            let text = message
                .get(TEXT_KEY)
                .and_then(Value::as_str)
                .ok_or(TaskFault::BadMessage("no msg text"))?;
            self.sink.show(text);
            self.shown += 1;
        }
        Ok(Condition::wait_message().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Content, TaskId};
    use crate::scheduler::{Scheduler, SchedulerConfig};
    use crate::tick::SoftClock;

    #[derive(Default)]
    struct Lines(heapless::Vec<heapless::String<32>, 8>);

    impl DisplaySink for Lines {
        fn show(&mut self, text: &str) {
            let mut line = heapless::String::new();
            let _ = line.push_str(text);
            let _ = self.0.push(line);
        }
    }

    /// Sends a prepared sequence of contents, one per 10 ms
    struct Script {
        target: TaskId,
        items: heapless::Vec<Content, 4>,
    }

    impl Routine for Script {
        fn resume(&mut self, _: &Context<'_>, _: Option<Message>) -> Result<Step, TaskFault> {
            if self.items.is_empty() {
                return Ok(Step::Complete);
            }
            let content = self.items.remove(0);
            Ok(Condition::sleep(10).send(self.target, content).into())
        }
    }

    #[test]
    fn test_display_shows_text() {
        let mut display = DisplayTask::new(Lines::default());
        let mut script = Script {
            target: TaskId::new(0),
            items: heapless::Vec::new(),
        };
        let _ = script.items.push(Content::new().with(TEXT_KEY, "hello"));
        let _ = script.items.push(Content::new().with(TEXT_KEY, "world"));
        {
            let mut s = Scheduler::new(SchedulerConfig::new(), SoftClock::new());
            s.spawn("display", &mut display).unwrap();
            s.spawn("script", &mut script).unwrap();
            for _ in 0..4 {
                s.step().unwrap();
                s.clock_mut().advance(10);
            }
        }
        let lines: heapless::Vec<&str, 8> = display.sink().0.iter().map(|l| l.as_str()).collect();
        assert_eq!(&lines[..], &["hello", "world"]);
        assert_eq!(display.shown(), 2);
    }

    #[test]
    fn test_display_survives_bad_message() {
        let mut display = DisplayTask::new(Lines::default());
        let mut script = Script {
            target: TaskId::new(0),
            items: heapless::Vec::new(),
        };
        let _ = script.items.push(Content::new().with("other", 1));
        let _ = script.items.push(Content::new().with(TEXT_KEY, "still here"));
        let faults;
        {
            let mut s = Scheduler::new(SchedulerConfig::new(), SoftClock::new());
            s.spawn("display", &mut display).unwrap();
            s.spawn("script", &mut script).unwrap();
            for _ in 0..4 {
                s.step().unwrap();
                s.clock_mut().advance(10);
            }
            faults = s.task(TaskId::new(0)).map(|t| t.stats().faults);
        }
        assert_eq!(faults, Some(1));
        assert_eq!(display.sink().0.len(), 1);
        assert_eq!(display.sink().0[0].as_str(), "still here");
    }
}
