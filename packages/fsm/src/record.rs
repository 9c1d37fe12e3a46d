//! Records and the state vocabulary machines operate on.
//!
//! A [`Record`] is the unit of persistence: a state value (which carries the
//! domain payload legal in that state) plus audit metadata. States are closed
//! sum types per machine — each variant holds exactly the data shape that is
//! legal in that state, so an illegal payload is unrepresentable.

use std::fmt::Debug;

use serde_json::Value;
use thiserror::Error;

/// Audit-string value written by legacy-synchronization writers.
///
/// External change-watchers read this marker off `lastTransition` to decide
/// whether a change must be propagated back to the legacy system of record.
/// The value is a cross-system wire convention and must not change. Use
/// [`Record::mark_legacy_sync`] and [`Record::is_legacy_sync`] rather than
/// spelling the literal out at call sites.
pub const LEGACY_SYNC: &str = "synced from legacy";

/// Name used in audit strings for the "no record exists yet" pseudo-state.
pub const EMPTY_SOURCE: &str = "empty";

/// A stored document failed to decode as a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The `fsm.state` tag names no state of the owning machine.
    #[error("unknown fsm state '{found}'")]
    UnknownState { found: String },

    /// A state-specific metadata field is absent.
    #[error("state '{state}' requires fsm field '{field}'")]
    MissingField {
        state: &'static str,
        field: &'static str,
    },

    /// The document is not shaped like a record envelope at all.
    #[error("malformed record document: {0}")]
    Json(#[from] serde_json::Error),
}

/// The state vocabulary of one machine.
///
/// Implementations are closed enums where each variant carries the payload
/// legal in that state. The codec methods translate between the enum and the
/// wire envelope `{ "data": ..., "fsm": { "state": ..., ... } }` that stores
/// and downstream consumers see.
pub trait MachineState: Clone + Debug + Send + Sync + 'static {
    /// The state's wire tag, e.g. `"draft"`.
    fn tag(&self) -> &'static str;

    /// Decode a stored document into a record.
    ///
    /// Decoding validates the document against the union of all legal state
    /// shapes: an unknown tag or a missing state-specific field is a
    /// [`DecodeError`], never a silently defaulted value.
    fn decode_record(doc: &Value) -> Result<Record<Self>, DecodeError>;

    /// Encode a record into its wire envelope.
    fn encode_record(record: &Record<Self>) -> Result<Value, serde_json::Error>;

    /// Canonicalize string fields before persistence.
    ///
    /// Default is the identity; machines whose payload carries display names
    /// trim them here. Called by the engine on every write path.
    fn normalize(self) -> Self {
        self
    }
}

/// A versioned domain record: current state plus audit metadata.
///
/// `last_transition` is purely descriptive ("apply submit on draft"); the
/// matcher never branches on it. The one sanctioned read of its value is the
/// [`LEGACY_SYNC`] convention consumed by external watchers.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<S> {
    pub state: S,
    pub last_transition: Option<String>,
}

impl<S: MachineState> Record<S> {
    /// A record with no audit trail yet.
    pub fn new(state: S) -> Self {
        Self {
            state,
            last_transition: None,
        }
    }

    /// A record with an explicit audit string.
    pub fn with_audit(state: S, last_transition: impl Into<String>) -> Self {
        Self {
            state,
            last_transition: Some(last_transition.into()),
        }
    }

    /// Stamp this record as written by legacy synchronization.
    pub fn mark_legacy_sync(mut self) -> Self {
        self.last_transition = Some(LEGACY_SYNC.to_string());
        self
    }

    /// Was this record last written by legacy synchronization?
    pub fn is_legacy_sync(&self) -> bool {
        self.last_transition.as_deref() == Some(LEGACY_SYNC)
    }

    /// Normalize the payload ahead of a store write.
    pub(crate) fn normalized(self) -> Self {
        Self {
            state: self.state.normalize(),
            last_transition: self.last_transition,
        }
    }
}

/// A requested operation on a machine, carrying its arguments.
///
/// Implementations are enums with one variant per operation; `name` returns
/// the wire-level action name the transition table is keyed by.
pub trait Action: Debug + Send + Sync {
    fn name(&self) -> &'static str;
}
