//! Messages — immutable, task-addressed, fixed-size
//!
//! A message carries a small string-keyed map of values from one task to
//! exactly one receiver. No broadcast, no heap.
//!
//! Author: Moroya Sakamoto

use core::fmt;
use heapless::{FnvIndexMap, String};

/// Maximum entries in one message content map (power of two)
pub const MAX_FIELDS: usize = 4;

/// Maximum bytes in one text value
pub const TEXT_CAPACITY: usize = 32;

/// Stable task identifier, assigned at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// Sender id stamped on messages posted from outside the task set
    /// (interrupt handlers, a secondary core)
    pub const EXTERNAL: TaskId = TaskId(u8::MAX);

    /// Id of the `index`-th registered task
    ///
    /// Ids are handed out sequentially from zero, so a static topology can
    /// name a task before it is registered (forward message targets).
    pub const fn new(index: u8) -> Self {
        TaskId(index)
    }

    /// Registry slot index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TaskId::EXTERNAL {
            write!(f, "#ext")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// A single content value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Bool(bool),
    Text(String<TEXT_CAPACITY>),
}

impl Value {
    /// Text value, truncated at a char boundary to [`TEXT_CAPACITY`]
    pub fn text(s: &str) -> Self {
        let mut out = String::new();
        for ch in s.chars() {
            if out.push(ch).is_err() {
                break;
            }
        }
        Value::Text(out)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

/// Message content map
#[derive(Debug, Clone, Default)]
pub struct Content {
    fields: FnvIndexMap<&'static str, Value, MAX_FIELDS>,
}

impl Content {
    pub fn new() -> Self {
        Self { fields: FnvIndexMap::new() }
    }

    /// Builder form of [`Content::insert`]
    ///
    /// A field that does not fit is dropped with a warning.
    pub fn with(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        if self.insert(key, value).is_err() {
            log::warn!("message content full, dropped field {:?}", key);
        }
        self
    }

    /// Insert or replace a field. Returns the rejected field when the map is full.
    pub fn insert(
        &mut self,
        key: &'static str,
        value: impl Into<Value>,
    ) -> Result<(), (&'static str, Value)> {
        self.fields.insert(key, value.into()).map(|_| ())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

/// Delivered message
///
/// Immutable once created; the scheduler stamps the sender, so a task can
/// never forge another task's identity.
#[derive(Debug, Clone)]
pub struct Message {
    content: Content,
    sender: TaskId,
    receiver: TaskId,
}

impl Message {
    pub(crate) fn new(content: Content, sender: TaskId, receiver: TaskId) -> Self {
        Self { content, sender, receiver }
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn sender(&self) -> TaskId {
        self.sender
    }

    pub fn receiver(&self) -> TaskId {
        self.receiver
    }

    /// Shortcut for `content().get(key)`
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.content.get(key)
    }

    /// Take the content out of the message
    pub fn into_content(self) -> Content {
        self.content
    }
}
