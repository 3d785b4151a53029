//! Conversation state coordination: session CRUD, history, and the
//! send-then-stream flow.

pub mod ids;
pub mod log;
pub mod message;
pub mod poller;

pub use ids::{MessageId, RequestId, SessionId, UserId};
pub use log::{MessageLog, SharedLog};
pub use message::{Fragment, Message, MessageRole, MessageStatus};
pub use poller::{DeltaPoller, PollEvent, PollHandle, PollOutcome, UpdatesSource};

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::api::types::Session;
use crate::api::{ApiClient, ApiError, ApiResult};

/// Title given to a freshly created session.
const NEW_SESSION_TITLE: &str = "New conversation";
/// Maximum characters of the first message used as an auto-generated title.
const TITLE_MAX_CHARS: usize = 20;
/// Minimum trimmed length before auto-titling is attempted.
const TITLE_MIN_CHARS: usize = 3;

/// Coordinates sessions, per-session message logs, and the delta poller.
///
/// Each session's log is owned here and handed out as a shared handle; all
/// log mutation goes through the service or the poll it started. At most
/// one streaming poll is active across the service.
pub struct ChatService {
    api: Arc<ApiClient>,
    logs: DashMap<SessionId, SharedLog>,
    poller: DeltaPoller<ApiClient>,
}

impl ChatService {
    /// Create a service over an API client.
    #[must_use]
    pub fn new(api: Arc<ApiClient>) -> Self {
        let period = api.config().poll_interval;
        Self {
            api: Arc::clone(&api),
            logs: DashMap::new(),
            poller: DeltaPoller::new(api, period),
        }
    }

    /// Shared log for a session, created empty on first access.
    #[must_use]
    pub fn log(&self, session_id: SessionId) -> SharedLog {
        Arc::clone(self.logs.entry(session_id).or_default().value())
    }

    /// List the logged-in account's sessions.
    ///
    /// # Errors
    /// Returns `Unauthorized` when no credential is stored, or the request
    /// failure.
    pub async fn sessions(&self) -> ApiResult<Vec<Session>> {
        let user_id = self.api.tokens().user_id().ok_or(ApiError::Unauthorized)?;
        self.api.sessions(user_id).await
    }

    /// Create a session with the default title.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn create_session(&self) -> ApiResult<SessionId> {
        let session_id = self.api.create_session(NEW_SESSION_TITLE).await?;
        debug!(%session_id, "session created");
        Ok(session_id)
    }

    /// Rename a session.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn rename_session(&self, session_id: SessionId, title: &str) -> ApiResult<()> {
        self.api.rename_session(session_id, title).await
    }

    /// Delete a session. A streaming poll targeting it is stopped and its
    /// log is dropped.
    ///
    /// # Errors
    /// Returns an error if the request fails; local state is untouched then.
    pub async fn delete_session(&self, session_id: SessionId) -> ApiResult<()> {
        self.api.delete_session(session_id).await?;
        if self.poller.active_session() == Some(session_id) {
            self.poller.stop();
        }
        self.logs.remove(&session_id);
        Ok(())
    }

    /// Replace a session's log with the server-side history.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn load_messages(&self, session_id: SessionId) -> ApiResult<()> {
        let messages = self.api.messages(session_id).await?;
        let shared = self.log(session_id);
        log::lock(&shared).replace_all(messages);
        Ok(())
    }

    /// Send a user message. The acknowledged id is echoed into the log and
    /// returned as the baseline to hand to [`Self::stream_updates`]. The
    /// first message of a session also triggers auto-titling.
    ///
    /// # Errors
    /// Returns an error if the send request fails.
    pub async fn send_message(&self, session_id: SessionId, content: &str) -> ApiResult<MessageId> {
        let model = self.api.config().model.clone();
        let message_id = self.api.send_message(session_id, content, &model).await?;

        let shared = self.log(session_id);
        let first_message = {
            let mut guard = log::lock(&shared);
            let was_empty = guard.is_empty();
            guard.push(Message::user(message_id, content));
            was_empty
        };
        if first_message {
            self.auto_title(session_id, content).await;
        }
        Ok(message_id)
    }

    /// Start streaming the reply acknowledged by `baseline` into the
    /// session's log. Any previously running poll is stopped first.
    #[must_use]
    pub fn stream_updates(
        &self,
        session_id: SessionId,
        baseline: MessageId,
        on_event: impl Fn(PollEvent) + Send + Sync + 'static,
    ) -> PollHandle {
        self.poller
            .start(session_id, baseline, self.log(session_id), on_event)
    }

    /// Stop the running streaming poll, if any.
    pub fn stop_streaming(&self) {
        self.poller.stop();
    }

    /// Derive a title from the first message and request the rename.
    /// Failures are logged and swallowed; titling is cosmetic.
    async fn auto_title(&self, session_id: SessionId, content: &str) {
        let Some(title) = derive_title(content) else {
            return;
        };
        if let Err(err) = self.api.rename_session(session_id, &title).await {
            debug!(%session_id, %err, "auto-title failed");
        }
    }
}

/// Title derived from trimmed message content. Too-short content yields
/// none; long content is cut at [`TITLE_MAX_CHARS`] characters with an
/// ellipsis.
fn derive_title(content: &str) -> Option<String> {
    let trimmed = content.trim();
    let chars = trimmed.chars().count();
    if chars < TITLE_MIN_CHARS {
        return None;
    }
    let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    if chars > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::api::{ApiConfig, TokenStore};
    use crate::net::monitor::AvailabilityMonitor;

    fn service() -> ApiResult<ChatService> {
        let config = ApiConfig::new().with_base_url("http://localhost:5000");
        let tokens = Arc::new(TokenStore::new());
        let monitor = Arc::new(AvailabilityMonitor::new(&config)?);
        let api = Arc::new(ApiClient::new(config, tokens, monitor)?);
        Ok(ChatService::new(api))
    }

    #[test]
    fn test_short_content_yields_no_title() {
        assert_eq!(derive_title("hi"), None);
        assert_eq!(derive_title("  a  "), None);
    }

    #[test]
    fn test_short_enough_content_is_kept_verbatim() {
        assert_eq!(
            derive_title("  How do trains work?  "),
            Some("How do trains work?".to_string())
        );
    }

    #[test]
    fn test_long_content_is_truncated_with_ellipsis() {
        let title = derive_title("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(title, Some("abcdefghijklmnopqrst...".to_string()));
    }

    #[test]
    fn test_exactly_max_chars_gets_no_ellipsis() {
        let content = "a".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&content), Some(content));
    }

    #[test]
    fn test_log_registry_hands_out_one_log_per_session() -> anyhow::Result<()> {
        let service = service()?;
        let a = service.log(SessionId::new(1));
        let b = service.log(SessionId::new(1));
        let other = service.log(SessionId::new(2));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        Ok(())
    }

    #[tokio::test]
    async fn test_sessions_requires_a_credential() -> anyhow::Result<()> {
        let service = service()?;
        let result = service.sessions().await;
        assert!(result.is_err_and(|e| e.is_unauthorized()));
        Ok(())
    }
}
