//! Transitions and transition-table validation.
//!
//! A transition is `(action, source, target, run)` where `run` is a pure
//! function from the current record (if any) and the action's arguments to a
//! new record. IO never happens inside `run`; the engine owns fetch and save.

use thiserror::Error;

use crate::record::{Action, MachineState, Record, EMPTY_SOURCE};

/// The source a transition fires from.
///
/// `Source::None` is the pseudo-state "no record exists yet" and is the only
/// legal source for transitions that create a record from nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    None,
    State(&'static str),
}

impl Source {
    /// Name used in audit strings and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Source::None => EMPTY_SOURCE,
            Source::State(tag) => tag,
        }
    }

    /// Does this source match the tag of the current record (if any)?
    pub(crate) fn matches(&self, current: Option<&str>) -> bool {
        match (self, current) {
            (Source::None, None) => true,
            (Source::State(from), Some(tag)) => *from == tag,
            _ => false,
        }
    }
}

/// Outcome of a transition's pure computation.
///
/// `changed` is the persistence signal: when false the engine returns the
/// computed record without writing to the store (the idempotent no-op path).
#[derive(Debug, Clone, PartialEq)]
pub struct Applied<S> {
    pub record: Record<S>,
    pub changed: bool,
}

impl<S: MachineState> Applied<S> {
    /// A computed record that must be persisted.
    pub fn changed(state: S) -> Self {
        Self {
            record: Record::new(state),
            changed: true,
        }
    }

    /// An existing record returned untouched; no store write will happen.
    pub fn unchanged(record: Record<S>) -> Self {
        Self {
            record,
            changed: false,
        }
    }
}

/// A transition's pure computation failed.
#[derive(Debug, Error)]
#[error("{reason}")]
pub struct ExecFailure {
    pub reason: String,
}

impl ExecFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Pure compute function of a transition.
///
/// Receives the current record typed to the machine's state set (`None` when
/// the transition fires from [`Source::None`]) and the requested action with
/// its arguments.
pub type TransitionFn<S, A> = fn(Option<&Record<S>>, &A) -> Result<Applied<S>, ExecFailure>;

/// One row of a machine's transition table.
pub struct Transition<S, A> {
    pub action: &'static str,
    pub from: Source,
    pub to: &'static str,
    pub run: TransitionFn<S, A>,
}

impl<S, A> Clone for Transition<S, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, A> Copy for Transition<S, A> {}

impl<S, A> std::fmt::Debug for Transition<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("action", &self.action)
            .field("from", &self.from.name())
            .field("to", &self.to)
            .finish()
    }
}

/// A machine definition is structurally broken.
///
/// This is a programming defect caught at construction time, distinct from
/// runtime domain errors: a table that ships ambiguous is a bug, not an
/// illegal request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("transition table is empty")]
    Empty,

    #[error("ambiguous transition table: action '{action}' from '{from}' matches {count} transitions")]
    Ambiguous {
        action: &'static str,
        from: &'static str,
        count: usize,
    },
}

/// Check that a table is non-empty and unambiguous.
///
/// Well-formedness means: for every (action, source) pair at most one
/// transition matches. The runtime matcher re-checks this per call and
/// reports `TooManyTransitions`; validating here catches the defect at
/// startup instead of on the first unlucky request.
pub fn validate_table<S: MachineState, A: Action>(
    table: &[Transition<S, A>],
) -> Result<(), DefinitionError> {
    if table.is_empty() {
        return Err(DefinitionError::Empty);
    }

    for (i, transition) in table.iter().enumerate() {
        let count = table
            .iter()
            .filter(|other| other.action == transition.action && other.from == transition.from)
            .count();
        if count > 1 {
            // Report on first occurrence only; later duplicates are the same defect.
            let first = table
                .iter()
                .position(|other| {
                    other.action == transition.action && other.from == transition.from
                })
                .unwrap_or(i);
            if first == i {
                return Err(DefinitionError::Ambiguous {
                    action: transition.action,
                    from: transition.from.name(),
                    count,
                });
            }
        }
    }

    Ok(())
}
