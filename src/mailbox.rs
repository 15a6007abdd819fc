//! Mailbox — per-task FIFO inbox
//!
//! Bounded ring of pending messages. Enqueue never blocks and never fails:
//! the device has no way to push back on a sender, so a full inbox drops
//! its oldest message to make room and counts the loss.
//!
//! Only one task body runs at a time, so the inbox needs no locking.
//!
//! Author: Moroya Sakamoto

use heapless::Deque;

use crate::message::Message;

/// Messages each task can hold before dropping the oldest
pub const MAILBOX_DEPTH: usize = 8;

/// Per-task FIFO inbox
pub struct Mailbox<const N: usize = MAILBOX_DEPTH> {
    queue: Deque<Message, N>,
    dropped: u32,
}

impl<const N: usize> Mailbox<N> {
    /// Create an empty mailbox
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
            dropped: 0,
        }
    }

    /// Append a message
    ///
    /// Returns the message evicted to make room, if the inbox was full.
    pub fn enqueue(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.queue.is_full() {
            self.dropped = self.dropped.saturating_add(1);
            self.queue.pop_front()
        } else {
            None
        };
        if let Some(old) = &evicted {
            log::warn!(
                "mailbox {} full, dropped oldest message from {}",
                old.receiver(),
                old.sender()
            );
        }
        // Cannot fail: a slot was freed above if the queue was full
        let _ = self.queue.push_back(message);
        evicted
    }

    /// Pop the oldest pending message
    pub fn dequeue(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    /// Oldest pending message, without removing it
    pub fn peek(&self) -> Option<&Message> {
        self.queue.front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Messages lost to overflow since creation
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Discard every pending message
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl<const N: usize> Default for Mailbox<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Content, TaskId, Value};

    fn msg(n: i32) -> Message {
        Message::new(Content::new().with("n", n), TaskId(0), TaskId(1))
    }

    fn n(m: &Message) -> i32 {
        m.get("n").and_then(Value::as_int).unwrap()
    }

    #[test]
    fn test_enqueue_dequeue() {
        let mut mb = Mailbox::<4>::new();
        assert!(mb.is_empty());
        assert!(mb.enqueue(msg(42)).is_none());
        assert_eq!(mb.len(), 1);
        assert_eq!(mb.dequeue().map(|m| n(&m)), Some(42));
        assert!(mb.is_empty());
        assert!(mb.dequeue().is_none());
    }

    #[test]
    fn test_fifo_order() {
        let mut mb = Mailbox::<8>::new();
        for i in 0..5 {
            mb.enqueue(msg(i));
        }
        for i in 0..5 {
            assert_eq!(mb.dequeue().map(|m| n(&m)), Some(i));
        }
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut mb = Mailbox::<3>::new();
        for i in 0..3 {
            assert!(mb.enqueue(msg(i)).is_none());
        }
        assert!(mb.is_full());
        let evicted = mb.enqueue(msg(3));
        assert_eq!(evicted.map(|m| n(&m)), Some(0));
        assert_eq!(mb.dropped(), 1);
        assert_eq!(mb.len(), 3);
        for i in 1..4 {
            assert_eq!(mb.dequeue().map(|m| n(&m)), Some(i));
        }
    }

    #[test]
    fn test_wraparound() {
        let mut mb = Mailbox::<4>::new();
        for round in 0..3 {
            for i in 0..4 {
                mb.enqueue(msg(round * 10 + i));
            }
            for i in 0..4 {
                assert_eq!(mb.dequeue().map(|m| n(&m)), Some(round * 10 + i));
            }
        }
        assert_eq!(mb.dropped(), 0);
    }

    #[test]
    fn test_peek_and_clear() {
        let mut mb = Mailbox::<4>::new();
        mb.enqueue(msg(7));
        mb.enqueue(msg(8));
        assert_eq!(mb.peek().map(n), Some(7));
        assert_eq!(mb.len(), 2);
        mb.clear();
        assert!(mb.is_empty());
        assert_eq!(mb.capacity(), 4);
    }
}
