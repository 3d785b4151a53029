//! Wire types for the chat backend API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ids::{MessageId, SessionId, UserId};
use crate::chat::message::{Fragment, Message};

/// Login request body.
#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// Successful login payload.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    /// Bearer token to attach to subsequent requests.
    pub access_token: String,
    /// Account the token belongs to.
    pub user_id: UserId,
}

/// Registration request body.
#[derive(Clone, Debug, Serialize)]
pub struct RegisterRequest {
    /// Requested account name.
    pub username: String,
    /// Account password.
    pub password: String,
}

/// A conversation session as listed by the backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Display title. Renamed by user action or the auto-titler.
    pub title: String,
    /// Set once at creation.
    pub created_at: DateTime<Utc>,
}

/// Payload of the session list endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionsResponse {
    /// Sessions belonging to the account.
    pub sessions: Vec<Session>,
}

/// Session creation request body.
#[derive(Clone, Debug, Serialize)]
pub struct CreateSessionRequest {
    /// Initial title.
    pub title: String,
}

/// Session creation payload.
#[derive(Clone, Debug, Deserialize)]
pub struct CreateSessionResponse {
    /// Identifier of the new session.
    pub session_id: SessionId,
}

/// Session rename request body.
#[derive(Clone, Debug, Serialize)]
pub struct RenameSessionRequest {
    /// New title.
    pub title: String,
}

/// Payload of the message history endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct MessagesResponse {
    /// Full history in conversation order.
    pub messages: Vec<Message>,
}

/// Message send request body.
#[derive(Clone, Debug, Serialize)]
pub struct SendMessageRequest {
    /// Target session.
    pub session_id: SessionId,
    /// Message text.
    pub content: String,
    /// Model requested for the reply.
    pub model: String,
}

/// Message send acknowledgment.
#[derive(Clone, Debug, Deserialize)]
pub struct SendMessageResponse {
    /// Id of the accepted user message, the baseline for delta polling.
    pub message_id: MessageId,
}

/// Payload of one delta poll tick.
#[derive(Clone, Debug, Deserialize)]
pub struct UpdatesResponse {
    /// Fragments newer than the cursor, in server order.
    pub messages: Vec<Fragment>,
}

/// Error body returned by the backend on application-level failures.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ErrorBody {
    /// Short error description.
    #[serde(default)]
    pub error: Option<String>,
    /// Optional detail text.
    #[serde(default)]
    pub details: Option<String>,
}

impl ErrorBody {
    /// Render the most specific message available.
    #[must_use]
    pub fn message(&self) -> String {
        match (&self.error, &self.details) {
            (Some(error), Some(details)) => format!("{error}: {details}"),
            (Some(error), None) => error.clone(),
            (None, Some(details)) => details.clone(),
            (None, None) => "request failed".to_string(),
        }
    }
}
