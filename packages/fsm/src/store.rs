//! The persistence contract machines are generic over.
//!
//! The engine requires three operations: point fetch, bulk fetch, and save.
//! Everything else about storage (client, retries, timeouts, partitioning) is
//! the implementation's business. Two implementations ship with the crate:
//! [`MemoryStore`](crate::MemoryStore) for deterministic tests and
//! [`DocumentStore`](crate::DocumentStore) for a production document store.
//!
//! # Concurrency
//!
//! There is no optimistic concurrency control at this layer. Each engine call
//! is an independent fetch-compute-save sequence; two concurrent writers to
//! the same id race, and the second save wins. Callers that need stronger
//! guarantees must serialize per id themselves.

use async_trait::async_trait;

use crate::record::{DecodeError, MachineState, Record};

/// Errors from record storage.
///
/// The distinction matters for handling:
/// - [`StoreError::Decode`] means a stored document no longer matches any
///   legal state shape. Retrying will not help; the data needs repair.
/// - [`StoreError::Backend`] means the storage layer failed (timeout,
///   connection, serialization). This is retryable.
#[derive(Debug)]
pub enum StoreError {
    /// A stored document failed to decode against the machine's state shapes.
    Decode(DecodeError),

    /// Storage backend failed (timeout, connection, serialization).
    Backend(anyhow::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Decode(e) => write!(f, "stored document did not decode: {}", e),
            StoreError::Backend(e) => write!(f, "storage backend error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Decode(e) => Some(e),
            StoreError::Backend(e) => Some(e.as_ref()),
        }
    }
}

impl From<DecodeError> for StoreError {
    fn from(err: DecodeError) -> Self {
        StoreError::Decode(err)
    }
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(err)
    }
}

/// Minimal persistence gateway consumed by the engine.
///
/// # Contract
///
/// - `fetch`: a missing id is `Ok(None)`, never an error. A document that
///   exists but fails to decode is `Err(StoreError::Decode)`.
/// - `bulk_fetch`: one `Option` per input id, in input order. An empty input
///   returns an empty vec without touching the backend. Per-item decode
///   failures map to `None` rather than failing the batch — bulk reads stay
///   resilient to partially-malformed historical data, at the documented
///   cost of masking it.
/// - `save`: upsert keyed by id, returning the stored record.
#[async_trait]
pub trait Store<S: MachineState>: Send + Sync {
    async fn fetch(&self, id: &str) -> Result<Option<Record<S>>, StoreError>;

    async fn bulk_fetch(&self, ids: &[String]) -> Result<Vec<Option<Record<S>>>, StoreError>;

    async fn save(&self, id: &str, record: Record<S>) -> Result<Record<S>, StoreError>;
}
