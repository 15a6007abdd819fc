//! External inbox — messages from outside the cooperative loop
//!
//! Interrupt handlers, or a second core running its own loop, cannot touch
//! task mailboxes directly: those are owned by the scheduler and mutated
//! without locks. They post here instead. The queue is guarded by a
//! critical section and drained by the scheduler at the start of every
//! scan cycle.
//!
//! ```ignore
//! static INBOX: ExternalInbox = ExternalInbox::new();
//!
//! fn usb_suspend_irq() {
//!     let _ = INBOX.post(display_id, Content::new().with("msg", "usb suspended"));
//! }
//! ```
//!
//! Author: Moroya Sakamoto

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::message::{Content, Message, TaskId};

/// Slots in the external inbox
pub const EXTERNAL_DEPTH: usize = 8;

/// Critical-section guarded queue shared with interrupt context
pub struct ExternalInbox {
    queue: Mutex<RefCell<Deque<Message, EXTERNAL_DEPTH>>>,
}

impl ExternalInbox {
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Post a message to `receiver`
    ///
    /// Interrupt context cannot wait, so a full queue rejects the post and
    /// hands the content back.
    pub fn post(&self, receiver: TaskId, content: Content) -> Result<(), Content> {
        critical_section::with(|cs| {
            let mut queue = self.queue.borrow_ref_mut(cs);
            queue
                .push_back(Message::new(content, TaskId::EXTERNAL, receiver))
                .map_err(Message::into_content)
        })
    }

    /// Take the oldest posted message
    pub(crate) fn take(&self) -> Option<Message> {
        critical_section::with(|cs| self.queue.borrow_ref_mut(cs).pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.queue.borrow_ref(cs).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExternalInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Value;

    #[test]
    fn test_post_and_take() {
        let inbox = ExternalInbox::new();
        assert!(inbox.post(TaskId(2), Content::new().with("n", 1)).is_ok());
        assert_eq!(inbox.len(), 1);
        let m = inbox.take().unwrap();
        assert_eq!(m.sender(), TaskId::EXTERNAL);
        assert_eq!(m.receiver(), TaskId(2));
        assert_eq!(m.get("n").and_then(Value::as_int), Some(1));
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_full_rejects() {
        let inbox = ExternalInbox::new();
        for i in 0..EXTERNAL_DEPTH as i32 {
            assert!(inbox.post(TaskId(0), Content::new().with("n", i)).is_ok());
        }
        let rejected = inbox.post(TaskId(0), Content::new().with("n", 99));
        let content = rejected.unwrap_err();
        assert_eq!(content.get("n").and_then(Value::as_int), Some(99));
        // FIFO preserved
        assert_eq!(inbox.take().and_then(|m| m.get("n").and_then(Value::as_int)), Some(0));
    }

    #[test]
    fn test_static_inbox() {
        static INBOX: ExternalInbox = ExternalInbox::new();
        assert!(INBOX.post(TaskId(1), Content::new()).is_ok());
        assert!(INBOX.take().is_some());
        assert!(INBOX.take().is_none());
    }
}
