//! Message and fragment types shared by the log and the poller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::MessageId;

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Sent by the account holder.
    User,
    /// Produced by the model.
    Assistant,
}

/// Lifecycle status of a message.
///
/// `Completed` and `Failed` are terminal: once a message reaches either, it
/// is never mutated again and a running poll for it stops.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted but not yet producing content.
    Pending,
    /// Content is still growing across poll ticks.
    Streaming,
    /// Finished normally.
    #[default]
    Completed,
    /// Finished with an error.
    Failed,
}

impl MessageStatus {
    /// Whether the message will never be mutated again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single chat message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Unique within a conversation, assigned by the server.
    pub id: MessageId,
    /// Author role.
    pub role: MessageRole,
    /// Text body. For a streaming assistant message this grows by appended
    /// fragments until the status turns terminal.
    pub content: String,
    /// Current lifecycle status. History payloads may omit it for settled
    /// messages, in which case it defaults to `Completed`.
    #[serde(default)]
    pub status: MessageStatus,
    /// Set once at creation, never changed.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build the locally echoed user message for an acknowledged send.
    #[must_use]
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: MessageRole::User,
            content: content.into(),
            status: MessageStatus::Completed,
            created_at: Utc::now(),
        }
    }

    /// Seed an assistant message from the first fragment of a reply.
    #[must_use]
    pub fn from_fragment(fragment: Fragment) -> Self {
        Self {
            id: fragment.id,
            role: MessageRole::Assistant,
            content: fragment.content,
            status: fragment.status,
            created_at: Utc::now(),
        }
    }
}

/// One incremental unit of assistant reply content returned by an updates
/// request, tagged with the message it belongs to and that message's
/// current status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fragment {
    /// Message the fragment belongs to.
    pub id: MessageId,
    /// Content to append (or, for the first fragment, the initial content).
    pub content: String,
    /// Status of the message as of this fragment.
    pub status: MessageStatus,
}
