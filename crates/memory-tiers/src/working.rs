//! Working memory: a bounded FIFO of the most recent messages.

use std::collections::VecDeque;

use memory_types::Message;

/// Per-session FIFO. The oldest message is dropped once `max_size` is exceeded.
#[derive(Debug, Clone)]
pub struct WorkingMemoryBuffer {
    session_id: String,
    messages: VecDeque<Message>,
    max_size: usize,
}

impl WorkingMemoryBuffer {
    pub fn new(session_id: impl Into<String>, max_size: usize) -> Self {
        Self {
            session_id: session_id.into(),
            messages: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append `message`, dropping the oldest entries beyond `max_size`.
    pub fn push(&mut self, message: Message) {
        self.messages.push_back(message);
        while self.messages.len() > self.max_size {
            self.messages.pop_front();
        }
    }

    /// The most recent `n` messages in chronological order.
    pub fn recent(&self, n: usize) -> Vec<Message> {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_types::{MemoryTier, Role};

    fn msg(content: &str) -> Message {
        Message::new(Role::User, content, MemoryTier::Working)
    }

    #[test]
    fn test_push_truncates_oldest() {
        let mut buffer = WorkingMemoryBuffer::new("s", 3);
        for i in 0..5 {
            buffer.push(msg(&format!("m{i}")));
        }
        assert_eq!(buffer.len(), 3);
        let contents: Vec<_> = buffer.recent(10).into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_recent_is_chronological_tail() {
        let mut buffer = WorkingMemoryBuffer::new("s", 10);
        for i in 0..4 {
            buffer.push(msg(&format!("m{i}")));
        }
        let contents: Vec<_> = buffer.recent(2).into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
        assert!(buffer.recent(0).is_empty());
    }
}
