//! Asynchronous settlement polling.
//!
//! While an intent sits in a server-paced state the poller re-fetches it on
//! a quadratic backoff schedule until the status moves or the retry budget
//! runs out. All state changes go through explicit transition functions
//! that return the scheduling action to take, so the "at most one pending
//! fetch" invariant is enforced (and testable) in one place.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::intent::{IntentKind, IntentSnapshot, IntentStatus};
use crate::transport::IntentTransport;

/// Delay before the next fetch, as a pure function of how many retries have
/// been consumed. Grows quadratically: the first retry is near-immediate,
/// later ones back off hard.
#[must_use]
pub const fn retry_delay(retry_count: u32) -> Duration {
    Duration::from_secs((retry_count as u64).pow(2))
}

/// Receives what the poller observes.
pub trait PollObserver: Send + Sync {
    /// The intent's status differs from the last observed value. Invoked
    /// once per distinct status.
    fn status_changed(&self, snapshot: &IntentSnapshot);

    /// The retry budget ran out without the status moving. The poller stops
    /// on its own; the caller decides what exhaustion means.
    fn exhausted(&self, attempts: u32);
}

/// What a state transition asks the caller to do next.
#[derive(Debug, PartialEq, Eq)]
enum BeginAction {
    /// A poll loop is already running; do not start another.
    AlreadyPolling,
    /// Start the poll loop for this generation.
    Fetch { generation: u64 },
}

#[derive(Debug)]
enum SuspendAction {
    AlreadyIdle,
    /// Abort the pending work item, if one exists.
    Cancel { pending: Option<JoinHandle<()>> },
}

/// Outcome of one fetch, as decided by the state machine.
#[derive(Debug, PartialEq, Eq)]
struct FetchDisposition {
    /// The session moved on (suspended or superseded); drop the result.
    discard: bool,
    /// The status differs from the last observed value.
    changed: bool,
    /// The retry budget ran out; carries the attempt count.
    exhausted: Option<u32>,
    /// Delay before the next fetch, when one should happen.
    next_delay: Option<Duration>,
}

impl FetchDisposition {
    const fn discarded() -> Self {
        Self {
            discard: true,
            changed: false,
            exhausted: None,
            next_delay: None,
        }
    }
}

/// Mutable state of one polling session.
#[derive(Debug)]
struct PollerState {
    active: bool,
    /// Bumped on every begin/suspend; work items carry the generation they
    /// were scheduled under and anything stale is discarded, not merely
    /// overwritten.
    generation: u64,
    retry_count: u32,
    last_observed_status: Option<IntentStatus>,
    pending: Option<JoinHandle<()>>,
}

impl PollerState {
    const fn new(last_observed_status: Option<IntentStatus>) -> Self {
        Self {
            active: false,
            generation: 0,
            retry_count: 0,
            last_observed_status,
            pending: None,
        }
    }

    fn on_begin(&mut self) -> BeginAction {
        if self.active {
            return BeginAction::AlreadyPolling;
        }
        self.active = true;
        self.generation += 1;
        BeginAction::Fetch {
            generation: self.generation,
        }
    }

    fn on_suspend(&mut self) -> SuspendAction {
        if !self.active {
            return SuspendAction::AlreadyIdle;
        }
        self.active = false;
        self.generation += 1;
        SuspendAction::Cancel {
            pending: self.pending.take(),
        }
    }

    /// Whether a work item scheduled under `generation` may fetch. Consumes
    /// one retry when it may.
    fn on_fetch_started(&mut self, generation: u64) -> bool {
        if !self.active || generation != self.generation {
            return false;
        }
        self.retry_count += 1;
        true
    }

    fn on_fetch_resolved(
        &mut self,
        generation: u64,
        status: Option<IntentStatus>,
        max_retries: u32,
    ) -> FetchDisposition {
        if !self.active || generation != self.generation {
            return FetchDisposition::discarded();
        }
        let changed = match status {
            Some(status) if self.last_observed_status != Some(status) => {
                self.last_observed_status = Some(status);
                true
            }
            _ => false,
        };
        if self.retry_count >= max_retries {
            self.active = false;
            return FetchDisposition {
                discard: false,
                changed,
                exhausted: Some(self.retry_count),
                next_delay: None,
            };
        }
        FetchDisposition {
            discard: false,
            changed,
            exhausted: None,
            next_delay: Some(retry_delay(self.retry_count)),
        }
    }
}

/// Re-fetches one intent until its status changes or retries run out.
///
/// `Idle → Polling → (Idle | Exhausted)`; [`begin_polling`](Self::begin_polling)
/// force-polls immediately, later fetches follow [`retry_delay`]. The retry
/// budget is monotonic for the session: suspending and resuming does not
/// extend it.
pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    transport: Arc<dyn IntentTransport>,
    kind: IntentKind,
    intent_id: String,
    client_secret: String,
    max_retries: u32,
    observer: Arc<dyn PollObserver>,
    state: Mutex<PollerState>,
}

impl PollerInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, PollerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusPoller {
    /// Creates an idle poller. `last_observed_status` seeds change
    /// detection with the status the caller already has, so the first
    /// notification really is a change.
    #[must_use]
    pub fn new(
        transport: Arc<dyn IntentTransport>,
        kind: IntentKind,
        intent_id: String,
        client_secret: String,
        max_retries: u32,
        last_observed_status: Option<IntentStatus>,
        observer: Arc<dyn PollObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                transport,
                kind,
                intent_id,
                client_secret,
                max_retries,
                observer,
                state: Mutex::new(PollerState::new(last_observed_status)),
            }),
        }
    }

    /// Starts polling with an immediate fetch, bypassing backoff. A second
    /// call while polling is a no-op: there is never more than one
    /// outstanding fetch per session.
    pub fn begin_polling(&self) {
        let mut state = self.inner.lock();
        match state.on_begin() {
            BeginAction::AlreadyPolling => {
                log::debug!("polling already active for {}", self.inner.intent_id);
            }
            BeginAction::Fetch { generation } => {
                log::info!("begin polling {}", self.inner.intent_id);
                state.pending =
                    Some(tokio::spawn(poll_loop(Arc::clone(&self.inner), generation)));
            }
        }
    }

    /// Stops polling and cancels any pending scheduled fetch. Idempotent;
    /// an in-flight fetch may still complete but its result is discarded.
    pub fn suspend_polling(&self) {
        let action = self.inner.lock().on_suspend();
        match action {
            SuspendAction::AlreadyIdle => {
                log::debug!("suspend while idle for {}", self.inner.intent_id);
            }
            SuspendAction::Cancel { pending } => {
                log::info!("suspend polling {}", self.inner.intent_id);
                if let Some(handle) = pending {
                    handle.abort();
                }
            }
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.suspend_polling();
    }
}

async fn poll_loop(inner: Arc<PollerInner>, generation: u64) {
    loop {
        if !inner.lock().on_fetch_started(generation) {
            return;
        }
        let result = inner
            .transport
            .fetch_intent(inner.kind, &inner.intent_id, &inner.client_secret)
            .await;
        let snapshot = match result {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                // Transient noise while waiting on settlement consumes a
                // retry but does not end the session.
                log::warn!("poll fetch for {} failed: {err}", inner.intent_id);
                None
            }
        };
        let disposition = inner.lock().on_fetch_resolved(
            generation,
            snapshot.as_ref().map(|snapshot| snapshot.status),
            inner.max_retries,
        );
        if disposition.discard {
            return;
        }
        if disposition.changed {
            if let Some(snapshot) = &snapshot {
                log::info!("intent {} moved to {}", inner.intent_id, snapshot.status);
                inner.observer.status_changed(snapshot);
            }
        }
        if let Some(attempts) = disposition.exhausted {
            log::info!(
                "polling budget for {} exhausted after {attempts} attempts",
                inner.intent_id
            );
            inner.observer.exhausted(attempts);
            return;
        }
        let Some(delay) = disposition.next_delay else {
            return;
        };
        tokio::time::sleep(delay).await;
    }
}
