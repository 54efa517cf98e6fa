//! Poll state machine
//!
//! Pure state machine: receives the last observation, returns
//! (new_state, action). The tracker performs the I/O (GETs, sleeps,
//! cancellation) implied by each action, so every transition here can be
//! tested without a clock or a server.
//!
//! Terminal states absorb every further event: once an operation is seen
//! finished, nothing changes it.

use crate::error::{CancelReason, Error, Result};
use crate::operation::{Operation, OperationKind, Outcome};
use crate::phase::{Authority, PhaseVocabulary, authoritative};

/// What to do when a state map names a phase outside the vocabulary.
///
/// The `error_on_unexpected_activity` flag is read narrowly here: it only
/// governs phase names this client does not recognize while polling an
/// operation it started. It does not detect other activities running
/// against the same resource in the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnexpectedActivityPolicy {
    /// Stop polling with `Error::UnexpectedPhase`
    Fail,
    /// Log and keep polling
    #[default]
    Warn,
}

impl UnexpectedActivityPolicy {
    /// Map the `error_on_unexpected_activity` config flag.
    pub fn from_flag(error_on_unexpected_activity: bool) -> Self {
        if error_on_unexpected_activity {
            Self::Fail
        } else {
            Self::Warn
        }
    }
}

/// Client-side view of a tracked operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Polling {
        polls: u32,
        last_phase: Option<String>,
    },
    Succeeded(Operation),
    Failed {
        phase: String,
        detail: String,
    },
    Unexpected {
        phase: String,
    },
    NotFound,
    Cancelled(CancelReason),
}

impl PollState {
    pub fn initial() -> Self {
        PollState::Polling {
            polls: 0,
            last_phase: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling { .. })
    }

    /// Outcome label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PollState::Polling { .. } => "polling",
            PollState::Succeeded(_) => "succeeded",
            PollState::Failed { .. } => "failed",
            PollState::Unexpected { .. } => "unexpected",
            PollState::NotFound => "not_found",
            PollState::Cancelled(_) => "cancelled",
        }
    }

    /// Convert a finished state into the caller-facing result.
    pub fn into_result(self, kind: OperationKind, id: &str) -> Result<Operation> {
        let kind_label = kind.label().to_string();
        match self {
            PollState::Succeeded(operation) => Ok(operation),
            PollState::Failed { detail, .. } => Err(Error::OperationFailed {
                kind: kind_label,
                id: id.to_string(),
                detail,
            }),
            PollState::Unexpected { phase } => Err(Error::UnexpectedPhase {
                kind: kind_label,
                id: id.to_string(),
                phase,
            }),
            PollState::NotFound => Err(Error::not_found(kind_label, id)),
            PollState::Cancelled(reason) => Err(Error::Cancelled {
                kind: kind_label,
                id: id.to_string(),
                reason,
            }),
            PollState::Polling { .. } => Err(Error::Transport(format!(
                "stopped polling {kind_label} {id} before it finished"
            ))),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// The status endpoint returned this representation
    Observed(Operation),
    /// The status endpoint answered 404
    Missing,
    /// The caller's cancellation token fired
    CancelRequested,
    /// `max_wait` elapsed
    DeadlineElapsed(std::time::Duration),
}

/// What the tracker should do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Sleep one poll interval, then fetch again
    Wait,
    /// Stop and report the state
    Finish,
}

/// Handle a state transition. Pure function: no I/O.
pub fn transition(
    state: PollState,
    event: PollEvent,
    vocabulary: &PhaseVocabulary,
    policy: UnexpectedActivityPolicy,
) -> (PollState, PollAction) {
    let polls = match state {
        PollState::Polling { polls, .. } => polls,
        terminal => return (terminal, PollAction::Finish),
    };

    match event {
        PollEvent::Observed(operation) => observe(operation, polls + 1, vocabulary, policy),
        PollEvent::Missing => (PollState::NotFound, PollAction::Finish),
        PollEvent::CancelRequested => (
            PollState::Cancelled(CancelReason::Caller),
            PollAction::Finish,
        ),
        PollEvent::DeadlineElapsed(waited) => (
            PollState::Cancelled(CancelReason::Deadline(waited)),
            PollAction::Finish,
        ),
    }
}

fn observe(
    mut operation: Operation,
    polls: u32,
    vocabulary: &PhaseVocabulary,
    policy: UnexpectedActivityPolicy,
) -> (PollState, PollAction) {
    // Resolve to owned data first; the authority borrows `operation.state`.
    let authority = match authoritative(&operation.state, vocabulary) {
        Authority::Failed { phase, record } => Err(PollState::Failed {
            phase: phase.to_string(),
            detail: record.error_detail(),
        }),
        Authority::Succeeded { record, .. } => Ok((Outcome::Succeeded, Some(record.clone()))),
        Authority::Skipped { .. } => Ok((Outcome::Skipped, None)),
        Authority::Pending {
            unrecognized: Some(phase),
            ..
        } if policy == UnexpectedActivityPolicy::Fail => Err(PollState::Unexpected {
            phase: phase.to_string(),
        }),
        Authority::Pending { phase, .. } => Err(PollState::Polling {
            polls,
            last_phase: phase.map(str::to_string),
        }),
    };

    match authority {
        Ok((outcome, record)) => {
            if let Some(record) = record {
                operation.capture_result(&record);
            }
            operation.outcome = Some(outcome);
            (PollState::Succeeded(operation), PollAction::Finish)
        }
        Err(state @ PollState::Polling { .. }) => (state, PollAction::Wait),
        Err(state) => (state, PollAction::Finish),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{PhaseMap, PhaseRecord};
    use crate::phase::{ACTIVITY_PHASES, BACKUP_JOB_PHASES};
    use std::time::Duration;

    fn op(entries: &[(&str, PhaseRecord)]) -> Operation {
        Operation {
            id: "op-1".into(),
            state: entries
                .iter()
                .map(|(n, r)| (*n, r.clone()))
                .collect::<PhaseMap>(),
            concerned_items: vec![],
            outcome: None,
        }
    }

    fn step(state: PollState, event: PollEvent) -> (PollState, PollAction) {
        transition(state, event, &ACTIVITY_PHASES, UnexpectedActivityPolicy::Warn)
    }

    #[test]
    fn pending_keeps_polling() {
        let (state, action) = step(
            PollState::initial(),
            PollEvent::Observed(op(&[("pending", PhaseRecord::default())])),
        );
        assert_eq!(action, PollAction::Wait);
        assert_eq!(
            state,
            PollState::Polling {
                polls: 1,
                last_phase: Some("pending".into())
            }
        );
    }

    #[test]
    fn completion_captures_result_as_concerned_item() {
        let (state, action) = step(
            PollState::Polling {
                polls: 1,
                last_phase: Some("pending".into()),
            },
            PollEvent::Observed(op(&[
                ("pending", PhaseRecord::default()),
                ("completed", PhaseRecord::with_result("vm-42")),
            ])),
        );
        assert_eq!(action, PollAction::Finish);
        let operation = state.into_result(OperationKind::Activity, "op-1").unwrap();
        assert_eq!(operation.concerned_items[0].id, "vm-42");
        assert_eq!(operation.outcome, Some(Outcome::Succeeded));
    }

    #[test]
    fn failure_phase_is_an_error() {
        let (state, action) = step(
            PollState::initial(),
            PollEvent::Observed(op(&[("failed", PhaseRecord::with_error("quota exceeded"))])),
        );
        assert_eq!(action, PollAction::Finish);
        let err = state
            .into_result(OperationKind::Activity, "op-1")
            .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }), "got: {err:?}");
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[test]
    fn skipped_backup_job_succeeds_with_skipped_outcome() {
        let (state, _) = transition(
            PollState::initial(),
            PollEvent::Observed(op(&[
                ("running", PhaseRecord::default()),
                ("skipped", PhaseRecord::default()),
            ])),
            &BACKUP_JOB_PHASES,
            UnexpectedActivityPolicy::Warn,
        );
        let operation = state.into_result(OperationKind::BackupJob, "job-1").unwrap();
        assert_eq!(operation.outcome, Some(Outcome::Skipped));
    }

    #[test]
    fn missing_is_not_found() {
        let (state, action) = step(PollState::initial(), PollEvent::Missing);
        assert_eq!(action, PollAction::Finish);
        let err = state
            .into_result(OperationKind::Activity, "ghost")
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to find activity with id \"ghost\"");
    }

    #[test]
    fn cancellation_and_deadline_are_distinct() {
        let (cancelled, _) = step(PollState::initial(), PollEvent::CancelRequested);
        assert_eq!(cancelled, PollState::Cancelled(CancelReason::Caller));

        let (deadline, _) = step(
            PollState::initial(),
            PollEvent::DeadlineElapsed(Duration::from_secs(30)),
        );
        assert_eq!(
            deadline,
            PollState::Cancelled(CancelReason::Deadline(Duration::from_secs(30)))
        );
    }

    #[test]
    fn unknown_phase_fails_only_under_fail_policy() {
        let observed = op(&[("migrating", PhaseRecord::default())]);

        let (warn_state, warn_action) = step(PollState::initial(), PollEvent::Observed(observed.clone()));
        assert_eq!(warn_action, PollAction::Wait);
        assert!(!warn_state.is_terminal());

        let (fail_state, fail_action) = transition(
            PollState::initial(),
            PollEvent::Observed(observed),
            &ACTIVITY_PHASES,
            UnexpectedActivityPolicy::Fail,
        );
        assert_eq!(fail_action, PollAction::Finish);
        assert_eq!(
            fail_state,
            PollState::Unexpected {
                phase: "migrating".into()
            }
        );
    }

    #[test]
    fn terminal_states_absorb_events() {
        let failed = PollState::Failed {
            phase: "failed".into(),
            detail: "boom".into(),
        };
        let (state, action) = step(
            failed.clone(),
            PollEvent::Observed(op(&[("completed", PhaseRecord::default())])),
        );
        assert_eq!(state, failed);
        assert_eq!(action, PollAction::Finish);

        let (state, _) = step(PollState::NotFound, PollEvent::CancelRequested);
        assert_eq!(state, PollState::NotFound);
    }

    #[test]
    fn poll_counter_increments() {
        let mut state = PollState::initial();
        for _ in 0..3 {
            let (next, _) = step(
                state,
                PollEvent::Observed(op(&[("running", PhaseRecord::default())])),
            );
            state = next;
        }
        assert!(matches!(state, PollState::Polling { polls: 3, .. }));
    }

    #[test]
    fn policy_from_flag() {
        assert_eq!(
            UnexpectedActivityPolicy::from_flag(true),
            UnexpectedActivityPolicy::Fail
        );
        assert_eq!(
            UnexpectedActivityPolicy::from_flag(false),
            UnexpectedActivityPolicy::Warn
        );
    }
}
