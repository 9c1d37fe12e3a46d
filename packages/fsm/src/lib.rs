//! # fsm
//!
//! A persistent finite-state-machine engine for versioned domain records:
//! transition tables decide, stores persist, and records carry their own
//! audit trail.
//!
//! ## Core Concepts
//!
//! - [`MachineState`] — a machine's state vocabulary as a closed sum type;
//!   each variant carries exactly the payload legal in that state
//! - [`Transition`] — `(action, source, target, pure compute function)`
//! - [`Machine`] — an ordered transition table plus the matcher/executor
//! - [`Store`] — the minimal fetch / bulk-fetch / save persistence contract
//!
//! ## Data Flow
//!
//! ```text
//! caller ─► Machine::apply(store, id, action)
//!               │
//!               ├─ store.fetch(id)            current record (or none)
//!               ├─ match transition table     exactly one row, or a typed error
//!               ├─ run pure compute           new record + changed flag
//!               └─ store.save(id, record)     skipped when changed == false
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Exactly one transition per call** — ambiguity (`TooManyTransitions`)
//!    and absence (`NoTransitionMatched`) are distinct, typed failures
//! 2. **Errors are values** — nothing is thrown across the engine boundary
//! 3. **No-change means no write** — the idempotent no-op path returns the
//!    computed record without touching the store
//! 4. **Audit, not control** — `last_transition` describes history and is
//!    never branched on by the matcher
//! 5. **Records are never physically deleted** — terminal states are ordinary
//!    states
//!
//! ## What This Is Not
//!
//! There is no optimistic concurrency control: each call is an independent
//! fetch-compute-save, and concurrent writers to one id race with
//! last-writer-wins semantics. There is no scheduler and no retry policy;
//! both belong to the caller and the store client.

mod document;
mod error;
mod machine;
mod record;
mod store;
mod transition;

// In-memory store (tests and consumers' test suites)
#[cfg(any(test, feature = "testing"))]
mod memory;

// Re-export record types
pub use record::{Action, DecodeError, MachineState, Record, EMPTY_SOURCE, LEGACY_SYNC};

// Re-export transition types
pub use transition::{
    validate_table, Applied, DefinitionError, ExecFailure, Source, Transition, TransitionFn,
};

// Re-export the matcher/executor
pub use machine::Machine;

// Re-export error types
pub use error::FsmError;

// Re-export store types
pub use store::{Store, StoreError};
pub use document::{DocumentApi, DocumentStore};

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryStore;

// Re-export commonly used external types
pub use async_trait::async_trait;
