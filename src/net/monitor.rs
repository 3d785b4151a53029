//! Backend reachability tracking.
//!
//! Single source of truth for "can we currently reach the backend",
//! decoupled from any specific request. The monitor never polls on its own
//! timer: ordinary traffic reports outcomes through the dispatch layer and
//! callers drive explicit re-probes (user retry, reconnect signal), so it
//! cannot fight the delta poller's timer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use url::Url;

use crate::api::config::ApiConfig;
use crate::api::error::{ApiError, ApiResult};

/// Path of the liveness endpoint. Any 2xx within the probe timeout counts.
const PING_PATH: &str = "/ping";

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct MonitorState {
    offline: bool,
    listener: Option<Listener>,
    generation: u64,
}

/// Tracks whether the backend is currently reachable.
///
/// Two states, `Online` and `Offline`. Any failed probe or outcome report
/// moves to `Offline`; only an explicit successful probe or outcome report
/// moves back to `Online`. The process starts online; there is no ambient
/// connectivity signal to consult before the first exchange.
pub struct AvailabilityMonitor {
    client: reqwest::Client,
    ping_url: Url,
    state: Arc<Mutex<MonitorState>>,
}

impl AvailabilityMonitor {
    /// Build a monitor with its own short-timeout probe client.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &ApiConfig) -> ApiResult<Self> {
        let ping_url = Url::parse(&config.base_url)?.join(PING_PATH)?;
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .connect_timeout(config.probe_timeout)
            .build()
            .map_err(|e| ApiError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            ping_url,
            state: Arc::new(Mutex::new(MonitorState {
                offline: false,
                listener: None,
                generation: 0,
            })),
        })
    }

    /// Issue a liveness request and fold the result into the cached state.
    ///
    /// Returns `true` when the backend answered with a success status within
    /// the probe timeout. Failures never propagate past this method.
    pub async fn probe(&self) -> bool {
        let alive = match self.client.get(self.ping_url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(?err, "liveness probe failed");
                false
            }
        };
        self.apply(!alive);
        alive
    }

    /// Fold the outcome of an ordinary HTTP exchange into the cached state,
    /// so application traffic doubles as a liveness signal.
    pub fn report_outcome(&self, success: bool) {
        self.apply(!success);
    }

    /// Cached reachability state. Never blocks on the network.
    #[must_use]
    pub fn current(&self) -> bool {
        lock_state(&self.state).offline
    }

    /// Register the transition listener, replacing any previous one.
    ///
    /// Exactly one listener is active at a time; the surrounding system is
    /// expected to hold at most one subscriber. The callback receives the
    /// new offline flag on transitions only, never on no-op updates.
    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let mut state = lock_state(&self.state);
        state.generation += 1;
        state.listener = Some(Arc::new(callback));
        Subscription {
            state: Arc::clone(&self.state),
            generation: state.generation,
        }
    }

    /// Update the cached flag; fires the listener only on a transition.
    /// The listener runs outside the state lock so it may call back into
    /// the monitor.
    fn apply(&self, offline: bool) {
        let listener = {
            let mut state = lock_state(&self.state);
            if state.offline == offline {
                return;
            }
            state.offline = offline;
            state.listener.clone()
        };
        info!(offline, "availability changed");
        if let Some(listener) = listener {
            listener(offline);
        }
    }
}

/// Handle for the registered availability listener.
///
/// Dropping it unregisters the listener, unless a newer registration has
/// already replaced it; a stale handle never clears its successor.
#[must_use = "dropping the subscription unregisters the listener"]
pub struct Subscription {
    state: Arc<Mutex<MonitorState>>,
    generation: u64,
}

impl Subscription {
    /// Unregister the listener if it is still the active one.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut state = lock_state(&self.state);
        if state.generation == self.generation {
            state.listener = None;
        }
    }
}

fn lock_state(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn monitor_for(base_url: &str) -> ApiResult<AvailabilityMonitor> {
        let config = ApiConfig::new()
            .with_base_url(base_url)
            .with_probe_timeout(Duration::from_millis(200));
        AvailabilityMonitor::new(&config)
    }

    fn recorded(
        monitor: &AvailabilityMonitor,
    ) -> (Subscription, Arc<Mutex<Vec<bool>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = monitor.subscribe(move |offline| {
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(offline);
        });
        (subscription, seen)
    }

    fn transitions(seen: &Arc<Mutex<Vec<bool>>>) -> Vec<bool> {
        seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Serve exactly one connection with a canned HTTP/1.1 response.
    async fn spawn_one_shot(response: &'static str) -> anyhow::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0_u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        Ok(format!("http://{addr}"))
    }

    #[test]
    fn test_starts_online() -> ApiResult<()> {
        let monitor = monitor_for("http://localhost:5000")?;
        assert!(!monitor.current());
        Ok(())
    }

    #[test]
    fn test_listener_fires_once_per_transition() -> ApiResult<()> {
        let monitor = monitor_for("http://localhost:5000")?;
        let (subscription, seen) = recorded(&monitor);

        monitor.report_outcome(true);
        monitor.report_outcome(true);
        assert!(transitions(&seen).is_empty());

        monitor.report_outcome(false);
        monitor.report_outcome(false);
        monitor.report_outcome(false);
        assert_eq!(transitions(&seen), vec![true]);

        monitor.report_outcome(true);
        assert_eq!(transitions(&seen), vec![true, false]);

        subscription.unsubscribe();
        Ok(())
    }

    #[test]
    fn test_stale_subscription_does_not_clear_successor() -> ApiResult<()> {
        let monitor = monitor_for("http://localhost:5000")?;
        let (stale, _) = recorded(&monitor);
        let (current, seen) = recorded(&monitor);

        drop(stale);
        monitor.report_outcome(false);
        assert_eq!(transitions(&seen), vec![true]);

        drop(current);
        monitor.report_outcome(true);
        assert_eq!(transitions(&seen), vec![true]);
        Ok(())
    }

    #[tokio::test]
    async fn test_probe_failure_flips_offline() -> anyhow::Result<()> {
        // Nothing listens on this port.
        let monitor = monitor_for("http://127.0.0.1:9")?;
        assert!(!monitor.probe().await);
        assert!(monitor.current());
        Ok(())
    }

    #[tokio::test]
    async fn test_successful_probe_recovers() -> anyhow::Result<()> {
        let base = spawn_one_shot(
            "HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
        )
        .await?;
        let monitor = monitor_for(&base)?;
        let (subscription, seen) = recorded(&monitor);

        monitor.report_outcome(false);
        assert!(monitor.current());

        assert!(monitor.probe().await);
        assert!(!monitor.current());
        assert_eq!(transitions(&seen), vec![true, false]);

        subscription.unsubscribe();
        Ok(())
    }

    #[tokio::test]
    async fn test_silent_server_times_out_as_offline() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            // Accept and hold the connection without ever responding.
            if let Ok((stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_secs(5)).await;
                drop(stream);
            }
        });

        let monitor = monitor_for(&format!("http://{addr}"))?;
        assert!(!monitor.probe().await);
        assert!(monitor.current());
        Ok(())
    }
}
