//! Phase vocabularies and precedence
//!
//! A state map may hold several phases at once (the history the operation
//! went through). The authoritative phase is picked by a fixed precedence:
//!
//! 1. a failure phase
//! 2. a success phase
//! 3. a skipped phase
//! 4. otherwise the most recently entered non-terminal phase (last key)
//!
//! Failure outranks success so a failure is never reported as success when
//! both appear. Names outside the vocabulary count as non-terminal; the
//! tracker decides whether they are an error.

use crate::operation::{PhaseMap, PhaseRecord};

/// Phase names for one operation kind. Matching is ASCII case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseVocabulary {
    pub pending: &'static [&'static str],
    pub success: &'static [&'static str],
    pub skipped: &'static [&'static str],
    pub failure: &'static [&'static str],
}

/// Generic activities.
pub const ACTIVITY_PHASES: PhaseVocabulary = PhaseVocabulary {
    pending: &["waiting", "pending", "running"],
    success: &["completed"],
    skipped: &[],
    failure: &["failed"],
};

/// Backup job runs.
pub const BACKUP_JOB_PHASES: PhaseVocabulary = PhaseVocabulary {
    pending: &["pending", "running", "in_progress"],
    success: &["completed", "success"],
    skipped: &["skipped", "no_op"],
    failure: &["failed", "canceled", "warning"],
};

/// Classification of a single phase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseClass {
    Pending,
    Succeeded,
    Skipped,
    Failed,
    Unknown,
}

impl PhaseClass {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseClass::Succeeded | PhaseClass::Skipped | PhaseClass::Failed
        )
    }
}

impl PhaseVocabulary {
    pub fn classify(&self, phase: &str) -> PhaseClass {
        let is = |names: &[&str]| names.iter().any(|n| n.eq_ignore_ascii_case(phase));
        if is(self.failure) {
            PhaseClass::Failed
        } else if is(self.success) {
            PhaseClass::Succeeded
        } else if is(self.skipped) {
            PhaseClass::Skipped
        } else if is(self.pending) {
            PhaseClass::Pending
        } else {
            PhaseClass::Unknown
        }
    }
}

/// The phase that decides what the tracker does next.
#[derive(Debug, Clone, PartialEq)]
pub enum Authority<'a> {
    Failed {
        phase: &'a str,
        record: &'a PhaseRecord,
    },
    Succeeded {
        phase: &'a str,
        record: &'a PhaseRecord,
    },
    Skipped {
        phase: &'a str,
    },
    Pending {
        /// Most recently entered non-terminal phase, if any
        phase: Option<&'a str>,
        /// First phase name outside the vocabulary, if any
        unrecognized: Option<&'a str>,
    },
}

/// Pick the authoritative phase of a state map.
pub fn authoritative<'a>(phases: &'a PhaseMap, vocabulary: &PhaseVocabulary) -> Authority<'a> {
    let mut failed = None;
    let mut succeeded = None;
    let mut skipped = None;
    let mut latest = None;
    let mut unrecognized = None;

    for (name, record) in phases.iter() {
        match vocabulary.classify(name) {
            PhaseClass::Failed => {
                failed.get_or_insert((name, record));
            }
            PhaseClass::Succeeded => {
                succeeded.get_or_insert((name, record));
            }
            PhaseClass::Skipped => {
                skipped.get_or_insert(name);
            }
            PhaseClass::Pending => latest = Some(name),
            PhaseClass::Unknown => {
                unrecognized.get_or_insert(name);
                latest = Some(name);
            }
        }
    }

    if let Some((phase, record)) = failed {
        Authority::Failed { phase, record }
    } else if let Some((phase, record)) = succeeded {
        Authority::Succeeded { phase, record }
    } else if let Some(phase) = skipped {
        Authority::Skipped { phase }
    } else {
        Authority::Pending {
            phase: latest,
            unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, PhaseRecord)]) -> PhaseMap {
        entries.iter().map(|(n, r)| (*n, r.clone())).collect()
    }

    #[test]
    fn classify_is_case_insensitive() {
        assert_eq!(ACTIVITY_PHASES.classify("Completed"), PhaseClass::Succeeded);
        assert_eq!(ACTIVITY_PHASES.classify("FAILED"), PhaseClass::Failed);
        assert_eq!(ACTIVITY_PHASES.classify("running"), PhaseClass::Pending);
        assert_eq!(ACTIVITY_PHASES.classify("exploded"), PhaseClass::Unknown);
    }

    #[test]
    fn vocabularies_differ_per_kind() {
        assert_eq!(ACTIVITY_PHASES.classify("skipped"), PhaseClass::Unknown);
        assert_eq!(BACKUP_JOB_PHASES.classify("skipped"), PhaseClass::Skipped);
        assert_eq!(BACKUP_JOB_PHASES.classify("warning"), PhaseClass::Failed);
        assert!(BACKUP_JOB_PHASES.classify("success").is_terminal());
        assert!(!BACKUP_JOB_PHASES.classify("in_progress").is_terminal());
    }

    #[test]
    fn terminal_outranks_non_terminal() {
        let phases = map(&[
            ("pending", PhaseRecord::default()),
            ("completed", PhaseRecord::with_result("vm-42")),
            ("running", PhaseRecord::default()),
        ]);
        match authoritative(&phases, &ACTIVITY_PHASES) {
            Authority::Succeeded { phase, record } => {
                assert_eq!(phase, "completed");
                assert_eq!(record.result, Some("vm-42".into()));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn failure_outranks_success() {
        let phases = map(&[
            ("completed", PhaseRecord::default()),
            ("failed", PhaseRecord::with_error("quota exceeded")),
        ]);
        assert!(matches!(
            authoritative(&phases, &ACTIVITY_PHASES),
            Authority::Failed { phase: "failed", .. }
        ));
    }

    #[test]
    fn success_outranks_skipped() {
        let phases = map(&[
            ("skipped", PhaseRecord::default()),
            ("success", PhaseRecord::default()),
        ]);
        assert!(matches!(
            authoritative(&phases, &BACKUP_JOB_PHASES),
            Authority::Succeeded { phase: "success", .. }
        ));
    }

    #[test]
    fn latest_non_terminal_wins_among_pending() {
        let phases = map(&[
            ("waiting", PhaseRecord::default()),
            ("running", PhaseRecord::default()),
        ]);
        assert_eq!(
            authoritative(&phases, &ACTIVITY_PHASES),
            Authority::Pending {
                phase: Some("running"),
                unrecognized: None
            }
        );
    }

    #[test]
    fn unknown_phase_is_reported_but_not_terminal() {
        let phases = map(&[
            ("running", PhaseRecord::default()),
            ("paused", PhaseRecord::default()),
        ]);
        assert_eq!(
            authoritative(&phases, &ACTIVITY_PHASES),
            Authority::Pending {
                phase: Some("paused"),
                unrecognized: Some("paused")
            }
        );
    }

    #[test]
    fn empty_state_is_pending() {
        assert_eq!(
            authoritative(&PhaseMap::default(), &ACTIVITY_PHASES),
            Authority::Pending {
                phase: None,
                unrecognized: None
            }
        );
    }
}
