//! Document-store adapter for production persistence.
//!
//! The concrete cloud client stays outside this crate; the adapter is generic
//! over [`DocumentApi`], the narrow surface the engine actually needs. The
//! adapter owns the mapping between raw documents and typed records:
//!
//! - a "not found" response becomes an absent result, not an error
//! - a found-but-undecodable document becomes [`StoreError::Decode`]
//! - per-item decode failures inside a bulk read map to absent, so one
//!   malformed historical document cannot fail a whole batch

use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::record::{MachineState, Record};
use crate::store::{Store, StoreError};

/// Raw document operations the adapter needs from a backend client.
///
/// Implementations wrap the real document-store SDK: `read` is a point read
/// that returns `None` for a missing id, `read_many` is a single multi-get
/// returning one entry per input id in input order, `upsert` writes keyed by
/// id and returns the stored document.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    async fn read(&self, id: &str) -> anyhow::Result<Option<Value>>;

    async fn read_many(&self, ids: &[String]) -> anyhow::Result<Vec<Option<Value>>>;

    async fn upsert(&self, id: &str, doc: Value) -> anyhow::Result<Value>;
}

/// [`Store`] implementation over a raw document client.
pub struct DocumentStore<S, C> {
    client: C,
    _state: PhantomData<fn() -> S>,
}

impl<S, C> DocumentStore<S, C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            _state: PhantomData,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

#[async_trait]
impl<S, C> Store<S> for DocumentStore<S, C>
where
    S: MachineState,
    C: DocumentApi,
{
    async fn fetch(&self, id: &str) -> Result<Option<Record<S>>, StoreError> {
        match self.client.read(id).await.map_err(StoreError::Backend)? {
            None => Ok(None),
            Some(doc) => Ok(Some(S::decode_record(&doc)?)),
        }
    }

    async fn bulk_fetch(&self, ids: &[String]) -> Result<Vec<Option<Record<S>>>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let docs = self
            .client
            .read_many(ids)
            .await
            .map_err(StoreError::Backend)?;

        let records = ids
            .iter()
            .zip(docs)
            .map(|(id, doc)| {
                doc.and_then(|doc| match S::decode_record(&doc) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        // Absent-on-decode-failure keeps bulk reads usable over
                        // partially-malformed history; the warn is the only
                        // trace the document existed.
                        warn!(id, error = %e, "bulk fetch: dropping undecodable document");
                        None
                    }
                })
            })
            .collect();
        Ok(records)
    }

    async fn save(&self, id: &str, record: Record<S>) -> Result<Record<S>, StoreError> {
        let doc = S::encode_record(&record).map_err(|e| StoreError::Backend(e.into()))?;
        self.client
            .upsert(id, doc)
            .await
            .map_err(StoreError::Backend)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DecodeError;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase", tag = "state")]
    enum Flag {
        Raised,
        Lowered,
    }

    impl MachineState for Flag {
        fn tag(&self) -> &'static str {
            match self {
                Flag::Raised => "raised",
                Flag::Lowered => "lowered",
            }
        }

        fn decode_record(doc: &Value) -> Result<Record<Self>, DecodeError> {
            let state: Flag = serde_json::from_value(doc.clone())?;
            Ok(Record::new(state))
        }

        fn encode_record(record: &Record<Self>) -> Result<Value, serde_json::Error> {
            serde_json::to_value(&record.state)
        }
    }

    /// Stub client recording how often each operation runs.
    #[derive(Default)]
    struct StubApi {
        docs: Mutex<HashMap<String, Value>>,
        reads: AtomicUsize,
        multi_gets: AtomicUsize,
        fail_backend: bool,
    }

    impl StubApi {
        fn with_doc(id: &str, doc: Value) -> Self {
            let stub = StubApi::default();
            stub.docs.lock().unwrap().insert(id.to_string(), doc);
            stub
        }
    }

    #[async_trait]
    impl DocumentApi for StubApi {
        async fn read(&self, id: &str) -> anyhow::Result<Option<Value>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_backend {
                anyhow::bail!("simulated backend outage");
            }
            Ok(self.docs.lock().unwrap().get(id).cloned())
        }

        async fn read_many(&self, ids: &[String]) -> anyhow::Result<Vec<Option<Value>>> {
            self.multi_gets.fetch_add(1, Ordering::SeqCst);
            let docs = self.docs.lock().unwrap();
            Ok(ids.iter().map(|id| docs.get(id).cloned()).collect())
        }

        async fn upsert(&self, id: &str, doc: Value) -> anyhow::Result<Value> {
            self.docs
                .lock()
                .unwrap()
                .insert(id.to_string(), doc.clone());
            Ok(doc)
        }
    }

    #[tokio::test]
    async fn missing_document_is_absent_not_an_error() {
        let store: DocumentStore<Flag, _> = DocumentStore::new(StubApi::default());

        let got = store.fetch("flag-1").await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn undecodable_document_is_a_decode_error() {
        let client = StubApi::with_doc("flag-1", json!({ "state": "shredded" }));
        let store: DocumentStore<Flag, _> = DocumentStore::new(client);

        let err = store.fetch("flag-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn backend_failures_surface_as_backend_errors() {
        let client = StubApi {
            fail_backend: true,
            ..StubApi::default()
        };
        let store: DocumentStore<Flag, _> = DocumentStore::new(client);

        let err = store.fetch("flag-1").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn save_upserts_and_round_trips() {
        let store: DocumentStore<Flag, _> = DocumentStore::new(StubApi::default());

        store
            .save("flag-1", Record::new(Flag::Raised))
            .await
            .unwrap();
        store
            .save("flag-1", Record::new(Flag::Lowered))
            .await
            .unwrap();

        let got = store.fetch("flag-1").await.unwrap().unwrap();
        assert_eq!(got.state, Flag::Lowered);
    }

    #[tokio::test]
    async fn bulk_fetch_empty_never_touches_the_client() {
        let store: DocumentStore<Flag, _> = DocumentStore::new(StubApi::default());

        let got = store.bulk_fetch(&[]).await.unwrap();

        assert!(got.is_empty());
        assert_eq!(store.client().multi_gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bulk_fetch_is_one_multi_get_in_input_order() {
        let client = StubApi::with_doc("a", json!({ "state": "raised" }));
        client
            .docs
            .lock()
            .unwrap()
            .insert("c".to_string(), json!({ "state": "lowered" }));
        let store: DocumentStore<Flag, _> = DocumentStore::new(client);

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let got = store.bulk_fetch(&ids).await.unwrap();

        assert_eq!(store.client().multi_gets.load(Ordering::SeqCst), 1);
        assert_eq!(got[0].as_ref().unwrap().state, Flag::Raised);
        assert!(got[1].is_none());
        assert_eq!(got[2].as_ref().unwrap().state, Flag::Lowered);
    }

    #[tokio::test]
    async fn bulk_fetch_drops_undecodable_items_without_failing_the_batch() {
        let client = StubApi::with_doc("good", json!({ "state": "raised" }));
        client
            .docs
            .lock()
            .unwrap()
            .insert("bad".to_string(), json!({ "state": "shredded" }));
        let store: DocumentStore<Flag, _> = DocumentStore::new(client);

        let ids = vec!["good".to_string(), "bad".to_string()];
        let got = store.bulk_fetch(&ids).await.unwrap();

        assert!(got[0].is_some());
        assert!(got[1].is_none());
    }
}
