//! Operation tracker: turn an operation id into a blocking "wait until done"
//!
//! Drives the pure state machine in `machine.rs`: fetch, transition, sleep,
//! repeat. Cancellation and the `max_wait` deadline are checked at every
//! await point (during the GET and during the sleep), so a cancelled wait
//! returns within one poll interval at most.
//!
//! Terminal outcomes (success and operation failure) are remembered per
//! `(kind, id)`; waiting again on a finished operation returns the same
//! value without another GET. The memo keeps the most recent
//! `memo_capacity` outcomes and evicts the oldest first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use common::RetryPolicy;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::machine::{PollAction, PollEvent, PollState, UnexpectedActivityPolicy, transition};
use crate::operation::{Operation, OperationKind};
use crate::phase::{ACTIVITY_PHASES, Authority, BACKUP_JOB_PHASES, PhaseVocabulary, authoritative};
use crate::source::OperationSource;

/// Default time between status GETs
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on a single wait
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30 * 60);

/// Default number of finished operations remembered per tracker
pub const DEFAULT_MEMO_CAPACITY: usize = 1024;

/// How to poll one operation.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_wait: Duration,
    pub vocabulary: PhaseVocabulary,
    pub unexpected: UnexpectedActivityPolicy,
    /// Retry transient GET failures. `None` surfaces them immediately.
    pub retry: Option<RetryPolicy>,
}

impl PollConfig {
    /// Defaults for an operation kind, using that kind's phase vocabulary.
    pub fn for_kind(kind: OperationKind) -> Self {
        let vocabulary = match kind {
            OperationKind::Activity => ACTIVITY_PHASES,
            OperationKind::BackupJob => BACKUP_JOB_PHASES,
        };
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
            vocabulary,
            unexpected: UnexpectedActivityPolicy::default(),
            retry: None,
        }
    }
}

type MemoKey = (OperationKind, String);

/// Terminal outcomes in insertion order.
#[derive(Default)]
struct Finished {
    outcomes: HashMap<MemoKey, Result<Operation>>,
    order: VecDeque<MemoKey>,
}

impl Finished {
    fn insert(&mut self, key: MemoKey, outcome: Result<Operation>, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.outcomes.insert(key.clone(), outcome).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.outcomes.remove(&oldest);
            }
        }
    }
}

pub struct OperationTracker {
    source: Arc<dyn OperationSource>,
    finished: Mutex<Finished>,
    memo_capacity: usize,
}

impl OperationTracker {
    pub fn new(source: Arc<dyn OperationSource>) -> Self {
        Self {
            source,
            finished: Mutex::new(Finished::default()),
            memo_capacity: DEFAULT_MEMO_CAPACITY,
        }
    }

    /// How many finished operations to remember. `0` disables the memo.
    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        self.memo_capacity = capacity;
        self
    }

    /// Forget every remembered outcome.
    pub async fn clear_finished(&self) {
        let mut finished = self.finished.lock().await;
        finished.outcomes.clear();
        finished.order.clear();
    }

    /// Poll `id` until it reaches a terminal phase.
    ///
    /// Returns the operation on success (or skip), `OperationFailed` on a
    /// failure phase, `NotFound` for an unknown id and `Cancelled` when
    /// `cancel` fires or `config.max_wait` elapses.
    pub async fn wait_for_completion(
        &self,
        kind: OperationKind,
        id: &str,
        config: &PollConfig,
        cancel: &CancellationToken,
    ) -> Result<Operation> {
        let key = (kind, id.to_string());
        if let Some(memo) = self.finished.lock().await.outcomes.get(&key).cloned() {
            debug!(operation_id = id, kind = kind.label(), "operation already finished");
            return memo;
        }

        let started = Instant::now();
        // A max_wait past the end of the clock means no deadline
        let deadline = started.checked_add(config.max_wait);
        let mut state = PollState::initial();

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => Ok(PollEvent::CancelRequested),
                _ = until(deadline) => Ok(PollEvent::DeadlineElapsed(config.max_wait)),
                fetched = self.fetch(kind, id, config) => {
                    fetched.map(|found| found.map_or(PollEvent::Missing, PollEvent::Observed))
                }
            };
            let event = match polled {
                Ok(event) => event,
                Err(e) => {
                    warn!(operation_id = id, kind = kind.label(), error = %e, "polling failed");
                    record_wait(kind, "error", started);
                    return Err(e);
                }
            };

            if let PollEvent::Observed(operation) = &event {
                self.note_unrecognized(kind, id, operation, config);
            }

            let (next, action) = transition(state, event, &config.vocabulary, config.unexpected);
            state = next;
            if action == PollAction::Finish {
                break;
            }

            if let PollState::Polling { polls, last_phase } = &state {
                debug!(
                    operation_id = id,
                    kind = kind.label(),
                    polls,
                    phase = last_phase.as_deref().unwrap_or("none"),
                    "operation still in progress"
                );
            }

            let interrupted = tokio::select! {
                biased;
                _ = cancel.cancelled() => Some(PollEvent::CancelRequested),
                _ = until(deadline) => Some(PollEvent::DeadlineElapsed(config.max_wait)),
                _ = tokio::time::sleep(config.interval) => None,
            };
            if let Some(event) = interrupted {
                let (next, _) = transition(state, event, &config.vocabulary, config.unexpected);
                state = next;
                break;
            }
        }

        let label = state.label();
        record_wait(kind, label, started);
        let result = state.into_result(kind, id);

        match &result {
            Ok(operation) => info!(
                operation_id = id,
                kind = kind.label(),
                concerned_items = operation.concerned_items.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "operation finished"
            ),
            Err(e) => warn!(operation_id = id, kind = kind.label(), outcome = label, error = %e, "operation did not succeed"),
        }

        if matches!(&result, Ok(_) | Err(Error::OperationFailed { .. })) {
            self.finished
                .lock()
                .await
                .insert(key, result.clone(), self.memo_capacity);
        }
        result
    }

    async fn fetch(
        &self,
        kind: OperationKind,
        id: &str,
        config: &PollConfig,
    ) -> Result<Option<Operation>> {
        metrics::counter!("cloud_activity_polls_total", "kind" => kind.metric_label()).increment(1);
        match &config.retry {
            Some(policy) => {
                common::retry(policy, Error::is_transient, || self.source.fetch(kind, id)).await
            }
            None => self.source.fetch(kind, id).await,
        }
    }

    fn note_unrecognized(
        &self,
        kind: OperationKind,
        id: &str,
        operation: &Operation,
        config: &PollConfig,
    ) {
        if config.unexpected != UnexpectedActivityPolicy::Warn {
            return;
        }
        if let Authority::Pending {
            unrecognized: Some(phase),
            ..
        } = authoritative(&operation.state, &config.vocabulary)
        {
            warn!(operation_id = id, kind = kind.label(), phase, "unrecognized phase, still polling");
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn record_wait(kind: OperationKind, outcome: &'static str, started: Instant) {
    metrics::histogram!(
        "cloud_activity_wait_seconds",
        "kind" => kind.metric_label(),
        "outcome" => outcome
    )
    .record(started.elapsed().as_secs_f64());
}
