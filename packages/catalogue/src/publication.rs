//! The publication machine: public visibility of a catalogue service.
//!
//! Two steady states, `published` and `unpublished`. Content flows in from
//! the lifecycle pipeline via `release` and is toggled with `publish` /
//! `unpublish`. Calling `publish` on an already-published record with no new
//! data is the idempotent no-write path.
//!
//! [`Publisher::release`] is a deliberate fast path: it bypasses the generic
//! matcher, computing the prior state only to preserve the audit-string
//! convention (`"apply release on <prior>"`, with `"empty"` when the record
//! did not exist yet).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fsm::{
    Action, Applied, DecodeError, DefinitionError, ExecFailure, FsmError, Machine, MachineState,
    Record, Source, Store, Transition, EMPTY_SOURCE,
};

use crate::service::ServiceData;

pub const PUBLISHED: &str = "published";
pub const UNPUBLISHED: &str = "unpublished";

/// Publication states.
#[derive(Debug, Clone, PartialEq)]
pub enum Publication {
    Published { data: ServiceData },
    Unpublished { data: ServiceData },
}

impl Publication {
    pub fn data(&self) -> &ServiceData {
        match self {
            Publication::Published { data } | Publication::Unpublished { data } => data,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Publication::Published { .. })
    }
}

#[derive(Serialize, Deserialize)]
struct PublicationDoc {
    data: ServiceData,
    fsm: PublicationFsm,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicationFsm {
    state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_transition: Option<String>,
}

impl MachineState for Publication {
    fn tag(&self) -> &'static str {
        match self {
            Publication::Published { .. } => PUBLISHED,
            Publication::Unpublished { .. } => UNPUBLISHED,
        }
    }

    fn decode_record(doc: &Value) -> Result<Record<Self>, DecodeError> {
        let doc: PublicationDoc = serde_json::from_value(doc.clone())?;
        let state = match doc.fsm.state.as_str() {
            PUBLISHED => Publication::Published { data: doc.data },
            UNPUBLISHED => Publication::Unpublished { data: doc.data },
            other => {
                return Err(DecodeError::UnknownState {
                    found: other.to_string(),
                })
            }
        };
        Ok(Record {
            state,
            last_transition: doc.fsm.last_transition,
        })
    }

    fn encode_record(record: &Record<Self>) -> Result<Value, serde_json::Error> {
        serde_json::to_value(PublicationDoc {
            data: record.state.data().clone(),
            fsm: PublicationFsm {
                state: record.state.tag().to_string(),
                last_transition: record.last_transition.clone(),
            },
        })
    }

    fn normalize(self) -> Self {
        match self {
            Publication::Published { data } => Publication::Published {
                data: data.normalized(),
            },
            Publication::Unpublished { data } => Publication::Unpublished {
                data: data.normalized(),
            },
        }
    }
}

/// Operations of the publication machine.
#[derive(Debug, Clone)]
pub enum PublicationAction {
    Release { data: ServiceData },
    Publish { data: Option<ServiceData> },
    Unpublish,
}

impl Action for PublicationAction {
    fn name(&self) -> &'static str {
        match self {
            PublicationAction::Release { .. } => "release",
            PublicationAction::Publish { .. } => "publish",
            PublicationAction::Unpublish => "unpublish",
        }
    }
}

type PublicationOutcome = Result<Applied<Publication>, ExecFailure>;

fn release(_current: Option<&Record<Publication>>, action: &PublicationAction) -> PublicationOutcome {
    let PublicationAction::Release { data } = action else {
        return Err(ExecFailure::new("release requires service data"));
    };
    Ok(Applied::changed(Publication::Unpublished {
        data: data.clone(),
    }))
}

fn publish(current: Option<&Record<Publication>>, action: &PublicationAction) -> PublicationOutcome {
    let PublicationAction::Publish { data } = action else {
        return Err(ExecFailure::new("publish carries optional service data"));
    };
    match (current, data) {
        (None, None) => Err(ExecFailure::new(
            "publish without data requires existing content",
        )),
        // New or replacement content: stays/becomes published.
        (_, Some(data)) => Ok(Applied::changed(Publication::Published {
            data: data.clone(),
        })),
        (Some(record), None) => match &record.state {
            // Already published, nothing new: the idempotent no-write path.
            Publication::Published { .. } => Ok(Applied::unchanged(record.clone())),
            Publication::Unpublished { data } => Ok(Applied::changed(Publication::Published {
                data: data.clone(),
            })),
        },
    }
}

fn unpublish(
    current: Option<&Record<Publication>>,
    _action: &PublicationAction,
) -> PublicationOutcome {
    let Some(record) = current else {
        return Err(ExecFailure::new("unpublish requires an existing record"));
    };
    Ok(Applied::changed(Publication::Unpublished {
        data: record.state.data().clone(),
    }))
}

/// The publication transition table.
pub fn table() -> Vec<Transition<Publication, PublicationAction>> {
    vec![
        Transition {
            action: "release",
            from: Source::None,
            to: UNPUBLISHED,
            run: release,
        },
        Transition {
            action: "release",
            from: Source::State(UNPUBLISHED),
            to: UNPUBLISHED,
            run: release,
        },
        Transition {
            action: "release",
            from: Source::State(PUBLISHED),
            to: UNPUBLISHED,
            run: release,
        },
        Transition {
            action: "publish",
            from: Source::None,
            to: PUBLISHED,
            run: publish,
        },
        Transition {
            action: "publish",
            from: Source::State(UNPUBLISHED),
            to: PUBLISHED,
            run: publish,
        },
        Transition {
            action: "publish",
            from: Source::State(PUBLISHED),
            to: PUBLISHED,
            run: publish,
        },
        Transition {
            action: "unpublish",
            from: Source::State(PUBLISHED),
            to: UNPUBLISHED,
            run: unpublish,
        },
        Transition {
            action: "unpublish",
            from: Source::State(UNPUBLISHED),
            to: UNPUBLISHED,
            run: unpublish,
        },
    ]
}

/// Pre-bound publication API over a store.
pub struct Publisher {
    machine: Machine<Publication, PublicationAction>,
    store: Arc<dyn Store<Publication>>,
}

impl Publisher {
    /// Bind the publication machine to a store, validating the table.
    pub fn new(store: Arc<dyn Store<Publication>>) -> Result<Self, DefinitionError> {
        Ok(Self {
            machine: Machine::validated(table())?,
            store,
        })
    }

    /// Write released content directly, bypassing the matcher.
    ///
    /// The final state follows `publish`; the audit string records the prior
    /// state exactly as the matcher path would have.
    pub async fn release(
        &self,
        id: &str,
        data: ServiceData,
        publish: bool,
    ) -> Result<Record<Publication>, FsmError> {
        let prior = self.store.fetch(id).await.map_err(FsmError::StoreFetch)?;
        let prior_tag = prior
            .as_ref()
            .map(|record| record.state.tag())
            .unwrap_or(EMPTY_SOURCE);

        let state = if publish {
            Publication::Published { data }
        } else {
            Publication::Unpublished { data }
        };
        let record = Record::with_audit(
            state.normalize(),
            format!("apply release on {}", prior_tag),
        );
        debug!(id, from = prior_tag, to = record.state.tag(), "releasing content");
        self.store
            .save(id, record)
            .await
            .map_err(FsmError::StoreSave)
    }

    pub async fn publish(
        &self,
        id: &str,
        data: Option<ServiceData>,
    ) -> Result<Record<Publication>, FsmError> {
        self.machine
            .apply(
                self.store.as_ref(),
                id,
                &PublicationAction::Publish { data },
            )
            .await
    }

    pub async fn unpublish(&self, id: &str) -> Result<Record<Publication>, FsmError> {
        self.machine
            .apply(self.store.as_ref(), id, &PublicationAction::Unpublish)
            .await
    }

    /// Replace the stored record unconditionally (legacy-sync path).
    pub async fn override_record(
        &self,
        id: &str,
        record: Record<Publication>,
    ) -> Result<Record<Publication>, FsmError> {
        self.machine
            .override_record(self.store.as_ref(), id, record)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Record<Publication>>, FsmError> {
        self.store.fetch(id).await.map_err(FsmError::StoreFetch)
    }

    pub async fn get_many(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<Record<Publication>>>, FsmError> {
        self.store
            .bulk_fetch(ids)
            .await
            .map_err(FsmError::StoreFetch)
    }
}
