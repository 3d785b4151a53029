//! Error types for the API transport layer.

use thiserror::Error;

/// Errors surfaced by API dispatch and the components built on it.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was obtained from the backend.
    #[error("transport failure: {0}")]
    Transport(#[source] reqwest::Error),

    /// The request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The credential was rejected. The stored token has already been
    /// cleared by the time this is returned.
    #[error("authentication rejected")]
    Unauthorized,

    /// Reachable backend refused the request.
    #[error("api error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message assembled from the response error body.
        message: String,
    },

    /// Request URL could not be built.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Response body could not be decoded.
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client configuration error.
    #[error("http client error: {0}")]
    HttpClient(String),
}

impl ApiError {
    /// Classify a `reqwest` failure: timeouts get their own variant, the
    /// rest count as transport failures.
    #[must_use]
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }

    /// Whether the backend could not be reached at all. Transport failures
    /// flip the availability monitor offline; application-level errors do
    /// not.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout)
    }

    /// Whether the failure was a credential rejection.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Convenience result alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
