//! In-memory store for deterministic tests.
//!
//! Documents are held as raw JSON so tests can seed history the machine can
//! no longer decode (the override-validation scenario) and inspect exactly
//! what would hit a real backend. Decoding happens on fetch, the same as the
//! production adapter.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::record::{MachineState, Record};
use crate::store::{Store, StoreError};

/// In-memory store backed by an id → raw document map.
///
/// `fetch` fails only when a seeded document no longer decodes; every other
/// operation is infallible. The store counts successful saves so tests can
/// assert the no-write path wrote nothing.
pub struct MemoryStore<S> {
    docs: Mutex<HashMap<String, Value>>,
    saves: AtomicUsize,
    _state: PhantomData<fn() -> S>,
}

impl<S> MemoryStore<S> {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            saves: AtomicUsize::new(0),
            _state: PhantomData,
        }
    }

    /// Place a raw document under an id, bypassing the codec.
    ///
    /// Escape hatch for seeding malformed or legacy-shaped history.
    pub fn seed_raw(&self, id: impl Into<String>, doc: Value) {
        self.docs
            .lock()
            .expect("memory store mutex poisoned")
            .insert(id.into(), doc);
    }

    /// The raw document stored under an id, if any.
    pub fn inspect(&self, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .expect("memory store mutex poisoned")
            .get(id)
            .cloned()
    }

    /// Number of successful saves since construction.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.docs.lock().expect("memory store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> Default for MemoryStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: MachineState> Store<S> for MemoryStore<S> {
    async fn fetch(&self, id: &str) -> Result<Option<Record<S>>, StoreError> {
        let docs = self
            .docs
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("mutex poisoned: {}", e)))?;
        match docs.get(id) {
            None => Ok(None),
            Some(doc) => Ok(Some(S::decode_record(doc)?)),
        }
    }

    async fn bulk_fetch(&self, ids: &[String]) -> Result<Vec<Option<Record<S>>>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self
            .docs
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("mutex poisoned: {}", e)))?;
        let records = ids
            .iter()
            .map(|id| {
                docs.get(id).and_then(|doc| match S::decode_record(doc) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(id, error = %e, "bulk fetch: dropping undecodable document");
                        None
                    }
                })
            })
            .collect();
        Ok(records)
    }

    async fn save(&self, id: &str, record: Record<S>) -> Result<Record<S>, StoreError> {
        let doc = S::encode_record(&record).map_err(|e| StoreError::Backend(e.into()))?;
        self.docs
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("mutex poisoned: {}", e)))?
            .insert(id.to_string(), doc);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }
}
