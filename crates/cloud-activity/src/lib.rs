//! Asynchronous operation tracking for the cloud API
//!
//! Long-running API calls answer with an operation id. This crate polls the
//! operation's status endpoint until its phase map reaches a terminal phase,
//! then hands back the finished operation (or the reason it did not finish).
//!
//! Flow:
//! 1. `HttpOperationSource` GETs `/activity/v1/activities/{id}` (or the
//!    backup job equivalent) through the authenticated `ApiTransport`
//! 2. `phase::authoritative` picks the deciding phase of the state map
//! 3. `machine::transition` turns that into the next poll state
//! 4. `OperationTracker` sleeps, re-polls, honours cancellation and the
//!    deadline, and remembers terminal outcomes

pub mod error;
pub mod machine;
pub mod operation;
pub mod phase;
pub mod source;
pub mod tracker;
pub mod transport;

pub use error::{CancelReason, Error, Result};
pub use machine::{PollAction, PollEvent, PollState, UnexpectedActivityPolicy, transition};
pub use operation::{ConcernedItem, Operation, OperationKind, Outcome, PhaseMap, PhaseRecord};
pub use phase::{ACTIVITY_PHASES, Authority, BACKUP_JOB_PHASES, PhaseClass, PhaseVocabulary};
pub use source::{HttpOperationSource, OperationSource};
pub use tracker::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, OperationTracker, PollConfig};
pub use transport::ApiTransport;
