//! Error taxonomy shared by the tracker, the transport and resource clients
//!
//! Messages are user-facing: the provider layer surfaces them unchanged,
//! so the `failed to find <kind> with id` wording must stay stable.

use std::fmt;
use std::time::Duration;

/// Why a wait ended without a terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The caller's cancellation token fired
    Caller,
    /// `PollConfig::max_wait` elapsed
    Deadline(Duration),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Caller => write!(f, "cancelled by caller"),
            CancelReason::Deadline(d) => write!(f, "gave up after {}s", d.as_secs()),
        }
    }
}

/// Errors returned to resource clients.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("authentication failed: {0}")]
    Authentication(#[from] cloud_auth::Error),

    #[error("failed to find {kind} with id \"{id}\"")]
    NotFound { kind: String, id: String },

    #[error("{kind} {id} failed: {detail}")]
    OperationFailed {
        kind: String,
        id: String,
        detail: String,
    },

    #[error("stopped waiting for {kind} {id}: {reason}")]
    Cancelled {
        kind: String,
        id: String,
        reason: CancelReason,
    },

    #[error("{kind} {id} reported unexpected phase \"{phase}\"")]
    UnexpectedPhase {
        kind: String,
        id: String,
        phase: String,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Network/decoding failures that a caller-supplied retry policy may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
