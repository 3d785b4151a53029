//! In-memory ordered message log and its merge invariants.
//!
//! The log is append-only at the conversation level: messages are never
//! reordered or removed individually. The only in-place mutation is content
//! growth of a streaming assistant message; once a message carries a
//! terminal status it is never touched again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::ids::MessageId;
use super::message::{Fragment, Message};

/// A message log shared between its owner and a running poll.
pub type SharedLog = Arc<Mutex<MessageLog>>;

/// Lock a shared log, recovering the data from a poisoned mutex.
#[must_use]
pub fn lock(log: &SharedLog) -> MutexGuard<'_, MessageLog> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered log of messages for one session.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Replace the whole log with server-side history.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Append a message. Rejects duplicate ids.
    pub fn push(&mut self, message: Message) -> bool {
        if self.contains(message.id) {
            warn!(id = %message.id, "dropping message with duplicate id");
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Merge a content delta into the message identified by `id`: append the
    /// fragment's content and overwrite the status with the fragment's.
    ///
    /// Rejects the delta if the message is unknown or already terminal.
    pub fn apply_fragment(&mut self, id: MessageId, fragment: &Fragment) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            warn!(%id, "fragment for unknown message");
            return false;
        };
        if message.status.is_terminal() {
            warn!(%id, status = ?message.status, "fragment for terminal message");
            return false;
        }
        message.content.push_str(&fragment.content);
        message.status = fragment.status;
        true
    }

    /// Look up a message by id.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Whether a message with this id is present.
    #[must_use]
    pub fn contains(&self, id: MessageId) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// All messages in conversation order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Id of the newest message, if any.
    #[must_use]
    pub fn last_id(&self) -> Option<MessageId> {
        self.messages.last().map(|m| m.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::MessageStatus;

    fn fragment(id: i64, content: &str, status: MessageStatus) -> Fragment {
        Fragment {
            id: MessageId::new(id),
            content: content.to_string(),
            status,
        }
    }

    #[test]
    fn test_fragments_concatenate_in_delivery_order() {
        let mut log = MessageLog::new();
        let first = fragment(42, "Hel", MessageStatus::Streaming);
        assert!(log.push(Message::from_fragment(first)));

        let second = fragment(42, "lo!", MessageStatus::Completed);
        assert!(log.apply_fragment(MessageId::new(42), &second));

        let message = log.get(MessageId::new(42));
        assert!(message.is_some_and(|m| m.content == "Hello!"));
        assert!(message.is_some_and(|m| m.status == MessageStatus::Completed));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut log = MessageLog::new();
        assert!(log.push(Message::user(MessageId::new(1), "hi")));
        assert!(!log.push(Message::user(MessageId::new(1), "again")));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_terminal_message_is_never_mutated() {
        let mut log = MessageLog::new();
        let first = fragment(5, "done", MessageStatus::Completed);
        assert!(log.push(Message::from_fragment(first)));

        let late = fragment(5, " extra", MessageStatus::Streaming);
        assert!(!log.apply_fragment(MessageId::new(5), &late));
        assert!(log.get(MessageId::new(5)).is_some_and(|m| m.content == "done"));
    }

    #[test]
    fn test_fragment_for_unknown_message_is_dropped() {
        let mut log = MessageLog::new();
        let stray = fragment(9, "?", MessageStatus::Streaming);
        assert!(!log.apply_fragment(MessageId::new(9), &stray));
        assert!(log.is_empty());
    }

    #[test]
    fn test_replace_all_and_last_id() {
        let mut log = MessageLog::new();
        log.replace_all(vec![
            Message::user(MessageId::new(1), "a"),
            Message::user(MessageId::new(2), "b"),
        ]);
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_id(), Some(MessageId::new(2)));
    }
}
