//! Configuration for the API client and its timers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backend base URL.
const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Environment variable overriding the backend base URL.
const API_BASE_ENV: &str = "CHATPULSE_API_BASE";

/// Default model requested for assistant replies.
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Timeout for ordinary API requests.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for the liveness probe. Short so reachability checks fail fast
/// instead of holding the UI for the full request timeout.
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Period of the delta poll timer.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Configuration for the chat backend client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend base URL.
    pub base_url: String,
    /// Timeout for ordinary API requests.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Timeout for the liveness probe, distinct from `request_timeout`.
    #[serde(with = "duration_serde")]
    pub probe_timeout: Duration,
    /// Period of the delta poll timer.
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    /// Model requested when sending a message.
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl ApiConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the general request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the liveness probe timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Set the delta poll period.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the model requested on send.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Resolve the backend base URL from the environment or the default.
fn default_base_url() -> String {
    std::env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}

/// Serde module for `Duration` serialization as integer milliseconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
