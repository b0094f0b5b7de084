//! Bounded session log buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of log entries retained per session.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// A single timestamped log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.timestamp.to_rfc3339(), self.message)
    }
}

/// Fixed-capacity append-only log. The oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append an entry, evicting the oldest if the buffer is full.
    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry::new(message));
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_tail() {
        let mut buffer = LogBuffer::new(10);
        buffer.push("first");
        buffer.push("second");
        buffer.push("third");

        let tail = buffer.tail(2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "second");
        assert_eq!(tail[1].message, "third");
    }

    #[test]
    fn test_eviction_at_capacity() {
        let mut buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.push(format!("entry {i}"));
        }
        assert_eq!(buffer.len(), 3);
        let tail = buffer.tail(3);
        assert_eq!(tail[0].message, "entry 2");
        assert_eq!(tail[2].message, "entry 4");
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = LogBuffer::new(4);
        for i in 0..100 {
            buffer.push(format!("entry {i}"));
            assert!(buffer.len() <= 4);
        }
    }

    #[test]
    fn test_tail_larger_than_len() {
        let mut buffer = LogBuffer::new(10);
        buffer.push("only");
        assert_eq!(buffer.tail(50).len(), 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut buffer = LogBuffer::new(0);
        buffer.push("entry");
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.capacity(), 1);
    }
}
