//! The engine's closed error taxonomy.
//!
//! Every engine operation returns `Result<_, FsmError>`; nothing is thrown
//! across the engine boundary. The taxonomy deliberately separates structural
//! engineering errors (an ambiguous table) from ordinary domain errors (an
//! illegal transition request) so callers can map them to different outcomes:
//!
//! | Variant                  | Caller's typical handling        |
//! |--------------------------|----------------------------------|
//! | `NoApplicableTransition` | programming error, 5xx           |
//! | `NoTransitionMatched`    | illegal request, 4xx             |
//! | `TooManyTransitions`     | fatal machine-definition defect  |
//! | `TransitionExecution`    | 5xx                              |
//! | `ItemNotFound`           | 404                              |
//! | `StoreFetch` / `StoreSave` | retryable                      |

use thiserror::Error;

use crate::store::StoreError;
use crate::transition::ExecFailure;

/// Error produced by `apply` and `override_record`.
#[derive(Debug, Error)]
pub enum FsmError {
    /// The action is unknown to this machine: no table row carries it at all.
    #[error("no transition for action '{action}' exists in this machine")]
    NoApplicableTransition { action: &'static str },

    /// The action exists but is not legal from the record's current state.
    #[error("action '{action}' is not legal from state '{state}'")]
    NoTransitionMatched {
        action: &'static str,
        state: &'static str,
    },

    /// More than one transition matched: the machine definition is ambiguous.
    #[error("ambiguous machine definition: action '{action}' from '{state}' matched {count} transitions")]
    TooManyTransitions {
        action: &'static str,
        state: &'static str,
        count: usize,
    },

    /// The matched transition's pure computation failed.
    #[error("transition '{action}' failed: {source}")]
    TransitionExecution {
        action: &'static str,
        source: ExecFailure,
    },

    /// The action requires an existing record and none was found.
    #[error("no record found for id '{id}'")]
    ItemNotFound { id: String },

    /// Fetching the current record failed (including decode failures of
    /// stored documents, which are fetch-time errors by definition).
    #[error("record fetch failed: {0}")]
    StoreFetch(#[source] StoreError),

    /// Persisting the computed record failed.
    #[error("record save failed: {0}")]
    StoreSave(#[source] StoreError),
}

impl FsmError {
    /// Is this a defect in the machine definition or engine wiring, as
    /// opposed to a bad request or infrastructure failure?
    pub fn is_definition_defect(&self) -> bool {
        matches!(
            self,
            FsmError::NoApplicableTransition { .. } | FsmError::TooManyTransitions { .. }
        )
    }

    /// Is this worth retrying as-is?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FsmError::StoreFetch(StoreError::Backend(_)) | FsmError::StoreSave(StoreError::Backend(_))
        )
    }
}
