//! Typed HTTP client for the chat backend.
//!
//! Every dispatch attaches the stored bearer credential, tags the request
//! with a correlation id, and feeds the exchange outcome to the
//! availability monitor so ordinary traffic doubles as a liveness signal.
//! A 401 clears the credential store before the error is surfaced.

pub mod auth;
pub mod config;
pub mod error;
pub mod types;

pub use auth::TokenStore;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::chat::ids::{MessageId, RequestId, SessionId, UserId};
use crate::chat::message::{Fragment, Message};
use crate::chat::poller::{PollFuture, UpdatesSource};
use crate::net::monitor::AvailabilityMonitor;

use types::{
    CreateSessionRequest, CreateSessionResponse, ErrorBody, LoginRequest, LoginResponse,
    MessagesResponse, RegisterRequest, RenameSessionRequest, SendMessageRequest,
    SendMessageResponse, Session, SessionsResponse, UpdatesResponse,
};

/// Header carrying the client-side correlation id.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Typed client for the chat backend.
pub struct ApiClient {
    config: ApiConfig,
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<TokenStore>,
    monitor: Arc<AvailabilityMonitor>,
}

impl ApiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(
        config: ApiConfig,
        tokens: Arc<TokenStore>,
        monitor: Arc<AvailabilityMonitor>,
    ) -> ApiResult<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ApiError::HttpClient(e.to_string()))?;

        Ok(Self {
            config,
            client,
            base_url,
            tokens,
            monitor,
        })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Shared credential store.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Shared availability monitor.
    #[must_use]
    pub const fn monitor(&self) -> &Arc<AvailabilityMonitor> {
        &self.monitor
    }

    /// Authenticate and store the returned credential.
    ///
    /// # Errors
    /// Returns an error if the request fails or the credentials are
    /// rejected.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<UserId> {
        let url = self.endpoint("/auth/login")?;
        let body = LoginRequest {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        let response = self.dispatch(self.client.post(url).json(&body)).await?;
        let payload: LoginResponse = Self::decode(response).await?;
        self.tokens.store(payload.access_token, payload.user_id);
        debug!(user_id = %payload.user_id, "logged in");
        Ok(payload.user_id)
    }

    /// Create a new account. Logging in is a separate call.
    ///
    /// # Errors
    /// Returns an error if the request fails or the name is taken.
    pub async fn register(&self, username: &str, password: &str) -> ApiResult<()> {
        let url = self.endpoint("/auth/register")?;
        let body = RegisterRequest {
            username: username.to_owned(),
            password: password.to_owned(),
        };
        self.dispatch(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    /// Drop the stored credential.
    pub fn logout(&self) {
        self.tokens.clear();
    }

    /// List the sessions belonging to `user_id`.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn sessions(&self, user_id: UserId) -> ApiResult<Vec<Session>> {
        let url = self.endpoint(&format!("/session/{user_id}"))?;
        let response = self.dispatch(self.client.get(url)).await?;
        let payload: SessionsResponse = Self::decode(response).await?;
        Ok(payload.sessions)
    }

    /// Create a session.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn create_session(&self, title: &str) -> ApiResult<SessionId> {
        let url = self.endpoint("/session/create")?;
        let body = CreateSessionRequest {
            title: title.to_owned(),
        };
        let response = self.dispatch(self.client.post(url).json(&body)).await?;
        let payload: CreateSessionResponse = Self::decode(response).await?;
        Ok(payload.session_id)
    }

    /// Rename a session.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn rename_session(&self, session_id: SessionId, title: &str) -> ApiResult<()> {
        let url = self.endpoint(&format!("/session/{session_id}"))?;
        let body = RenameSessionRequest {
            title: title.to_owned(),
        };
        self.dispatch(self.client.patch(url).json(&body)).await?;
        Ok(())
    }

    /// Delete a session and everything in it.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn delete_session(&self, session_id: SessionId) -> ApiResult<()> {
        let url = self.endpoint(&format!("/session/{session_id}"))?;
        self.dispatch(self.client.delete(url)).await?;
        Ok(())
    }

    /// Fetch the full message history of a session.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn messages(&self, session_id: SessionId) -> ApiResult<Vec<Message>> {
        let url = self.endpoint(&format!("/message/{session_id}"))?;
        let response = self.dispatch(self.client.get(url)).await?;
        let payload: MessagesResponse = Self::decode(response).await?;
        Ok(payload.messages)
    }

    /// Submit a user message. The returned id is the baseline cursor for
    /// delta polling.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn send_message(
        &self,
        session_id: SessionId,
        content: &str,
        model: &str,
    ) -> ApiResult<MessageId> {
        let url = self.endpoint("/message/send")?;
        let body = SendMessageRequest {
            session_id,
            content: content.to_owned(),
            model: model.to_owned(),
        };
        let response = self.dispatch(self.client.post(url).json(&body)).await?;
        let payload: SendMessageResponse = Self::decode(response).await?;
        Ok(payload.message_id)
    }

    /// Fetch the fragments newer than `after` for a session. One poll tick.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn message_updates(
        &self,
        session_id: SessionId,
        after: MessageId,
    ) -> ApiResult<Vec<Fragment>> {
        let mut url = self.endpoint(&format!("/message/{session_id}/updates"))?;
        url.query_pairs_mut()
            .append_pair("last_message_id", &after.to_string());
        let response = self.dispatch(self.client.get(url)).await?;
        let payload: UpdatesResponse = Self::decode(response).await?;
        Ok(payload.messages)
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base_url.join(path).map_err(ApiError::from)
    }

    /// Send a prepared request and normalize the outcome.
    async fn dispatch(&self, request: RequestBuilder) -> ApiResult<Response> {
        let request_id = RequestId::new();
        let mut request = request.header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = self.tokens.token() {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Err(err) => {
                self.monitor.report_outcome(false);
                warn!(%request_id, ?err, "request failed in transit");
                Err(ApiError::from_reqwest(err))
            }
            Ok(response) => {
                // Any response at all means the backend is reachable,
                // including ones it answers with an error status.
                self.monitor.report_outcome(true);
                self.check_status(request_id, response).await
            }
        }
    }

    async fn check_status(&self, request_id: RequestId, response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            warn!(%request_id, "credential rejected, clearing stored token");
            self.tokens.clear();
            return Err(ApiError::Unauthorized);
        }
        let body: ErrorBody = response.json().await.unwrap_or_default();
        Err(ApiError::Api {
            status: status.as_u16(),
            message: body.message(),
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let bytes = response.bytes().await.map_err(ApiError::from_reqwest)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl UpdatesSource for ApiClient {
    fn fetch_updates(
        &self,
        session_id: SessionId,
        after: MessageId,
    ) -> PollFuture<'_, ApiResult<Vec<Fragment>>> {
        Box::pin(async move { self.message_updates(session_id, after).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client_for(base_url: &str) -> ApiResult<ApiClient> {
        let config = ApiConfig::new()
            .with_base_url(base_url)
            .with_request_timeout(Duration::from_millis(500))
            .with_probe_timeout(Duration::from_millis(200));
        let tokens = Arc::new(TokenStore::new());
        let monitor = Arc::new(AvailabilityMonitor::new(&config)?);
        ApiClient::new(config, tokens, monitor)
    }

    /// Serve exactly one connection with a canned HTTP/1.1 response.
    async fn spawn_http_once(status: &'static str, body: &'static str) -> anyhow::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0_u8; 4096];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        Ok(format!("http://{addr}"))
    }

    #[test]
    fn test_endpoint_joins_absolute_paths() -> ApiResult<()> {
        let client = client_for("http://localhost:5000")?;
        let url = client.endpoint("/message/3/updates")?;
        assert_eq!(url.as_str(), "http://localhost:5000/message/3/updates");
        Ok(())
    }

    #[tokio::test]
    async fn test_updates_decode_and_report_online() -> anyhow::Result<()> {
        let base = spawn_http_once(
            "200 OK",
            r#"{"messages":[{"id":42,"content":"Hel","status":"streaming"}]}"#,
        )
        .await?;
        let client = client_for(&base)?;
        client.monitor().report_outcome(false);

        let fragments = client
            .message_updates(SessionId::new(3), MessageId::new(41))
            .await?;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].content, "Hel");
        // The successful exchange brought the monitor back online.
        assert!(!client.monitor().current());
        Ok(())
    }

    #[tokio::test]
    async fn test_unauthorized_clears_stored_token() -> anyhow::Result<()> {
        let base = spawn_http_once("401 UNAUTHORIZED", r#"{"error":"token expired"}"#).await?;
        let client = client_for(&base)?;
        client.tokens().store("stale-token", UserId::new(7));

        let result = client.sessions(UserId::new(7)).await;
        assert!(result.is_err_and(|e| e.is_unauthorized()));
        assert!(!client.tokens().is_authenticated());
        // A 401 is still a response; availability is unaffected.
        assert!(!client.monitor().current());
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_surfaces_body_without_offline() -> anyhow::Result<()> {
        let base = spawn_http_once(
            "500 INTERNAL SERVER ERROR",
            r#"{"error":"delete failed","details":"orphaned rows"}"#,
        )
        .await?;
        let client = client_for(&base)?;

        let result = client.delete_session(SessionId::new(3)).await;
        let Err(ApiError::Api { status, message }) = result else {
            anyhow::bail!("expected an application-level error");
        };
        assert_eq!(status, 500);
        assert_eq!(message, "delete failed: orphaned rows");
        assert!(!client.monitor().current());
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_failure_reports_offline() -> anyhow::Result<()> {
        // Nothing listens on this port.
        let client = client_for("http://127.0.0.1:9")?;
        let result = client
            .message_updates(SessionId::new(3), MessageId::new(41))
            .await;
        assert!(result.is_err_and(|e| e.is_transport()));
        assert!(client.monitor().current());
        Ok(())
    }
}
