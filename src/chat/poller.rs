//! Delta polling: emulating a streaming reply over request/response.
//!
//! A poll repeatedly asks the backend for "everything newer than the
//! baseline id" on a fixed-period timer and merges the returned fragments
//! into a shared message log. The first fragment of a reply introduces the
//! assistant message; every later fragment appends content to it. The poll
//! finishes when the last fragment of a tick carries a terminal status,
//! when a tick fails, or when it is stopped.
//!
//! Delivery is at most once per tick: a failed tick is not retried and its
//! fragments are lost; recovery is the caller's decision (resend or
//! reload). Ticks never overlap because the loop awaits the in-flight
//! request before the timer can fire again.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::error::{ApiError, ApiResult};

use super::ids::{MessageId, SessionId};
use super::log::{self, SharedLog};
use super::message::{Fragment, Message};

/// Boxed future type for updates sources.
pub type PollFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of message deltas past a cursor.
///
/// `ApiClient` is the production implementation. A push transport can
/// satisfy the same contract later without changing the poller's callers:
/// deliver ordered fragments, signal terminal status.
pub trait UpdatesSource: Send + Sync {
    /// Fetch the fragments with id greater than `after`, in server order.
    ///
    /// # Errors
    /// Returns an error if the updates request fails.
    fn fetch_updates(
        &self,
        session_id: SessionId,
        after: MessageId,
    ) -> PollFuture<'_, ApiResult<Vec<Fragment>>>;
}

/// Event delivered to the poll callback.
#[derive(Debug)]
pub enum PollEvent {
    /// The shared log gained or grew a message this tick.
    Updated,
    /// The poll finished. No further events or log mutations follow.
    Finished(PollOutcome),
}

/// Why a poll finished.
#[derive(Debug)]
pub enum PollOutcome {
    /// The reply reached a terminal status.
    Completed,
    /// A failure aborted the poll. Partial content stays in the log.
    Aborted(ApiError),
    /// The poll was stopped by its owner.
    Stopped,
}

/// Shared handle to a running poll.
#[derive(Clone)]
pub struct PollHandle {
    stop_flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl PollHandle {
    fn new() -> Self {
        Self {
            stop_flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Request the poll to stop. Idempotent. Ticks not yet dispatched never
    /// run; a tick already in flight completes but its result is discarded.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Whether the poll is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.stop_flag.load(Ordering::SeqCst)
    }
}

/// Cursor state for one streaming reply.
#[derive(Clone, Copy, Debug)]
struct PollCursor {
    session_id: SessionId,
    baseline: MessageId,
    active_assistant: Option<MessageId>,
}

struct ActivePoll {
    session_id: SessionId,
    handle: PollHandle,
}

/// Repeatedly fetches message deltas and merges them into a shared log.
///
/// At most one poll is active per poller; starting a new one stops the
/// previous one first, so two timers never race on the same state.
pub struct DeltaPoller<S> {
    source: Arc<S>,
    period: Duration,
    active: Mutex<Option<ActivePoll>>,
}

impl<S> DeltaPoller<S> {
    /// Create a poller over `source` with the given tick period.
    #[must_use]
    pub fn new(source: Arc<S>, period: Duration) -> Self {
        Self {
            source,
            period,
            active: Mutex::new(None),
        }
    }

    /// Session served by the currently running poll, if any.
    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        lock_active(&self.active)
            .as_ref()
            .filter(|poll| poll.handle.is_active())
            .map(|poll| poll.session_id)
    }

    /// Stop the running poll, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(poll) = lock_active(&self.active).take() {
            poll.handle.stop();
        }
    }
}

impl<S: UpdatesSource + 'static> DeltaPoller<S> {
    /// Start polling for fragments newer than `baseline`, merging them into
    /// `log`. Any previously running poll is stopped first.
    ///
    /// `on_event` receives `Updated` after every tick that introduced data
    /// and exactly one final `Finished`.
    #[must_use]
    pub fn start(
        &self,
        session_id: SessionId,
        baseline: MessageId,
        log: SharedLog,
        on_event: impl Fn(PollEvent) + Send + Sync + 'static,
    ) -> PollHandle {
        self.stop();

        let handle = PollHandle::new();
        *lock_active(&self.active) = Some(ActivePoll {
            session_id,
            handle: handle.clone(),
        });

        let task = PollTask {
            source: Arc::clone(&self.source),
            period: self.period,
            cursor: PollCursor {
                session_id,
                baseline,
                active_assistant: None,
            },
            log,
            handle: handle.clone(),
            on_event: Box::new(on_event),
        };
        tokio::spawn(task.run());

        handle
    }
}

impl<S> Drop for DeltaPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_active(active: &Mutex<Option<ActivePoll>>) -> MutexGuard<'_, Option<ActivePoll>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a single tick decided.
enum TickFlow {
    /// Nothing new, or data merged without a terminal status.
    Continue,
    /// The last fragment carried a terminal status.
    Terminal,
    /// The poll was stopped while the request was in flight.
    Discarded,
    /// The tick failed.
    Failed(ApiError),
}

struct PollTask<S> {
    source: Arc<S>,
    period: Duration,
    cursor: PollCursor,
    log: SharedLog,
    handle: PollHandle,
    on_event: Box<dyn Fn(PollEvent) + Send + Sync>,
}

impl<S: UpdatesSource> PollTask<S> {
    async fn run(mut self) {
        debug!(
            session = %self.cursor.session_id,
            baseline = %self.cursor.baseline,
            "poll started"
        );

        let mut ticker = time::interval_at(time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                biased;
                () = self.handle.notify.notified() => break PollOutcome::Stopped,
                _ = ticker.tick() => {
                    if !self.handle.is_active() {
                        break PollOutcome::Stopped;
                    }
                    match self.tick().await {
                        TickFlow::Continue => {}
                        TickFlow::Terminal => break PollOutcome::Completed,
                        TickFlow::Discarded => break PollOutcome::Stopped,
                        TickFlow::Failed(err) => break PollOutcome::Aborted(err),
                    }
                }
            }
        };

        self.handle.stop_flag.store(true, Ordering::SeqCst);
        debug!(session = %self.cursor.session_id, ?outcome, "poll finished");
        (self.on_event)(PollEvent::Finished(outcome));
    }

    async fn tick(&mut self) -> TickFlow {
        let fetched = self
            .source
            .fetch_updates(self.cursor.session_id, self.cursor.baseline)
            .await;

        // A stop issued while the request was in flight wins: the result
        // must not reach the shared log.
        if !self.handle.is_active() {
            return TickFlow::Discarded;
        }

        let fragments = match fetched {
            Ok(fragments) => fragments,
            Err(err) => {
                warn!(session = %self.cursor.session_id, %err, "poll tick failed");
                return TickFlow::Failed(err);
            }
        };
        if fragments.is_empty() {
            return TickFlow::Continue;
        }

        let terminal = fragments
            .last()
            .is_some_and(|fragment| fragment.status.is_terminal());
        self.merge(fragments);
        (self.on_event)(PollEvent::Updated);

        if terminal {
            TickFlow::Terminal
        } else {
            TickFlow::Continue
        }
    }

    /// Merge a tick's fragments in server order. The first fragment of the
    /// reply introduces the assistant message; later ones are content
    /// deltas addressed by their own id.
    fn merge(&mut self, fragments: Vec<Fragment>) {
        let mut guard = log::lock(&self.log);
        for fragment in fragments {
            if self.cursor.active_assistant.is_none() {
                let id = fragment.id;
                guard.push(Message::from_fragment(fragment));
                self.cursor.active_assistant = Some(id);
            } else {
                guard.apply_fragment(fragment.id, &fragment);
            }
        }
    }
}
