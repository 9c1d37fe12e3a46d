//! The lifecycle machine: editorial workflow of a catalogue service.
//!
//! States: `draft`, `submitted`, `approved`, `rejected`, `deleted`. A record
//! enters the machine only through `create` (from nothing to `draft`) and is
//! never physically removed; `deleted` is an ordinary terminal state.
//!
//! The `autoPublish` flag recorded at submit time travels with the record
//! into `approved`, so the publication pipeline can decide whether to
//! auto-release without consulting the submitter again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use fsm::{
    Action, Applied, DecodeError, DefinitionError, ExecFailure, FsmError, Machine, MachineState,
    Record, Source, Store, Transition,
};

use crate::service::ServiceData;

pub const DRAFT: &str = "draft";
pub const SUBMITTED: &str = "submitted";
pub const APPROVED: &str = "approved";
pub const REJECTED: &str = "rejected";
pub const DELETED: &str = "deleted";

/// Lifecycle states with the metadata legal in each.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceLifecycle {
    Draft {
        data: ServiceData,
    },
    Submitted {
        data: ServiceData,
        auto_publish: bool,
    },
    Approved {
        data: ServiceData,
        auto_publish: bool,
        approval_date: DateTime<Utc>,
    },
    Rejected {
        data: ServiceData,
        reason: String,
    },
    Deleted {
        data: ServiceData,
    },
}

impl ServiceLifecycle {
    pub fn data(&self) -> &ServiceData {
        match self {
            ServiceLifecycle::Draft { data }
            | ServiceLifecycle::Submitted { data, .. }
            | ServiceLifecycle::Approved { data, .. }
            | ServiceLifecycle::Rejected { data, .. }
            | ServiceLifecycle::Deleted { data } => data,
        }
    }
}

// Wire envelope: { "data": ..., "fsm": { "state": ..., ...extras } }.

#[derive(Serialize, Deserialize)]
struct ServiceDoc {
    data: ServiceData,
    fsm: ServiceFsm,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceFsm {
    state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    auto_publish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    approval_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_transition: Option<String>,
}

impl From<&Record<ServiceLifecycle>> for ServiceDoc {
    fn from(record: &Record<ServiceLifecycle>) -> Self {
        let mut fsm = ServiceFsm {
            state: record.state.tag().to_string(),
            auto_publish: None,
            approval_date: None,
            reason: None,
            last_transition: record.last_transition.clone(),
        };
        match &record.state {
            ServiceLifecycle::Draft { .. } | ServiceLifecycle::Deleted { .. } => {}
            ServiceLifecycle::Submitted { auto_publish, .. } => {
                fsm.auto_publish = Some(*auto_publish);
            }
            ServiceLifecycle::Approved {
                auto_publish,
                approval_date,
                ..
            } => {
                fsm.auto_publish = Some(*auto_publish);
                fsm.approval_date = Some(*approval_date);
            }
            ServiceLifecycle::Rejected { reason, .. } => {
                fsm.reason = Some(reason.clone());
            }
        }
        ServiceDoc {
            data: record.state.data().clone(),
            fsm,
        }
    }
}

impl TryFrom<ServiceDoc> for Record<ServiceLifecycle> {
    type Error = DecodeError;

    fn try_from(doc: ServiceDoc) -> Result<Self, DecodeError> {
        let ServiceDoc { data, fsm } = doc;
        let state = match fsm.state.as_str() {
            DRAFT => ServiceLifecycle::Draft { data },
            SUBMITTED => ServiceLifecycle::Submitted {
                data,
                auto_publish: fsm.auto_publish.ok_or(DecodeError::MissingField {
                    state: SUBMITTED,
                    field: "autoPublish",
                })?,
            },
            APPROVED => ServiceLifecycle::Approved {
                data,
                auto_publish: fsm.auto_publish.ok_or(DecodeError::MissingField {
                    state: APPROVED,
                    field: "autoPublish",
                })?,
                approval_date: fsm.approval_date.ok_or(DecodeError::MissingField {
                    state: APPROVED,
                    field: "approvalDate",
                })?,
            },
            REJECTED => ServiceLifecycle::Rejected {
                data,
                reason: fsm.reason.ok_or(DecodeError::MissingField {
                    state: REJECTED,
                    field: "reason",
                })?,
            },
            DELETED => ServiceLifecycle::Deleted { data },
            other => {
                return Err(DecodeError::UnknownState {
                    found: other.to_string(),
                })
            }
        };
        Ok(Record {
            state,
            last_transition: fsm.last_transition,
        })
    }
}

impl MachineState for ServiceLifecycle {
    fn tag(&self) -> &'static str {
        match self {
            ServiceLifecycle::Draft { .. } => DRAFT,
            ServiceLifecycle::Submitted { .. } => SUBMITTED,
            ServiceLifecycle::Approved { .. } => APPROVED,
            ServiceLifecycle::Rejected { .. } => REJECTED,
            ServiceLifecycle::Deleted { .. } => DELETED,
        }
    }

    fn decode_record(doc: &Value) -> Result<Record<Self>, DecodeError> {
        let doc: ServiceDoc = serde_json::from_value(doc.clone())?;
        doc.try_into()
    }

    fn encode_record(record: &Record<Self>) -> Result<Value, serde_json::Error> {
        serde_json::to_value(ServiceDoc::from(record))
    }

    fn normalize(self) -> Self {
        match self {
            ServiceLifecycle::Draft { data } => ServiceLifecycle::Draft {
                data: data.normalized(),
            },
            ServiceLifecycle::Submitted { data, auto_publish } => ServiceLifecycle::Submitted {
                data: data.normalized(),
                auto_publish,
            },
            ServiceLifecycle::Approved {
                data,
                auto_publish,
                approval_date,
            } => ServiceLifecycle::Approved {
                data: data.normalized(),
                auto_publish,
                approval_date,
            },
            ServiceLifecycle::Rejected { data, reason } => ServiceLifecycle::Rejected {
                data: data.normalized(),
                reason,
            },
            ServiceLifecycle::Deleted { data } => ServiceLifecycle::Deleted {
                data: data.normalized(),
            },
        }
    }
}

/// Operations of the lifecycle machine, with their arguments.
#[derive(Debug, Clone)]
pub enum LifecycleAction {
    Create { data: ServiceData },
    Edit { data: ServiceData },
    Submit { auto_publish: bool },
    Abort,
    Approve { approval_date: DateTime<Utc> },
    Reject { reason: String },
    Delete,
}

impl Action for LifecycleAction {
    fn name(&self) -> &'static str {
        match self {
            LifecycleAction::Create { .. } => "create",
            LifecycleAction::Edit { .. } => "edit",
            LifecycleAction::Submit { .. } => "submit",
            LifecycleAction::Abort => "abort",
            LifecycleAction::Approve { .. } => "approve",
            LifecycleAction::Reject { .. } => "reject",
            LifecycleAction::Delete => "delete",
        }
    }
}

// Pure transition computations. The matcher guarantees the source state;
// mismatches here mean the table and these functions drifted apart.

type LifecycleOutcome = Result<Applied<ServiceLifecycle>, ExecFailure>;

fn create(_current: Option<&Record<ServiceLifecycle>>, action: &LifecycleAction) -> LifecycleOutcome {
    let LifecycleAction::Create { data } = action else {
        return Err(ExecFailure::new("create requires service data"));
    };
    Ok(Applied::changed(ServiceLifecycle::Draft {
        data: data.clone(),
    }))
}

fn edit(_current: Option<&Record<ServiceLifecycle>>, action: &LifecycleAction) -> LifecycleOutcome {
    let LifecycleAction::Edit { data } = action else {
        return Err(ExecFailure::new("edit requires service data"));
    };
    Ok(Applied::changed(ServiceLifecycle::Draft {
        data: data.clone(),
    }))
}

fn submit(current: Option<&Record<ServiceLifecycle>>, action: &LifecycleAction) -> LifecycleOutcome {
    let Some(ServiceLifecycle::Draft { data }) = current.map(|r| &r.state) else {
        return Err(ExecFailure::new("submit requires a draft record"));
    };
    let LifecycleAction::Submit { auto_publish } = action else {
        return Err(ExecFailure::new("submit requires an autoPublish flag"));
    };
    Ok(Applied::changed(ServiceLifecycle::Submitted {
        data: data.clone(),
        auto_publish: *auto_publish,
    }))
}

fn abort(current: Option<&Record<ServiceLifecycle>>, _action: &LifecycleAction) -> LifecycleOutcome {
    let Some(ServiceLifecycle::Submitted { data, .. }) = current.map(|r| &r.state) else {
        return Err(ExecFailure::new("abort requires a submitted record"));
    };
    Ok(Applied::changed(ServiceLifecycle::Draft {
        data: data.clone(),
    }))
}

fn approve(
    current: Option<&Record<ServiceLifecycle>>,
    action: &LifecycleAction,
) -> LifecycleOutcome {
    let Some(ServiceLifecycle::Submitted { data, auto_publish }) = current.map(|r| &r.state) else {
        return Err(ExecFailure::new("approve requires a submitted record"));
    };
    let LifecycleAction::Approve { approval_date } = action else {
        return Err(ExecFailure::new("approve requires an approval date"));
    };
    // The flag recorded at submit time is carried forward for the
    // publication pipeline.
    Ok(Applied::changed(ServiceLifecycle::Approved {
        data: data.clone(),
        auto_publish: *auto_publish,
        approval_date: *approval_date,
    }))
}

fn reject(current: Option<&Record<ServiceLifecycle>>, action: &LifecycleAction) -> LifecycleOutcome {
    let Some(ServiceLifecycle::Submitted { data, .. }) = current.map(|r| &r.state) else {
        return Err(ExecFailure::new("reject requires a submitted record"));
    };
    let LifecycleAction::Reject { reason } = action else {
        return Err(ExecFailure::new("reject requires a reason"));
    };
    Ok(Applied::changed(ServiceLifecycle::Rejected {
        data: data.clone(),
        reason: reason.clone(),
    }))
}

fn delete(current: Option<&Record<ServiceLifecycle>>, _action: &LifecycleAction) -> LifecycleOutcome {
    let Some(record) = current else {
        return Err(ExecFailure::new("delete requires an existing record"));
    };
    Ok(Applied::changed(ServiceLifecycle::Deleted {
        data: record.state.data().clone(),
    }))
}

/// The lifecycle transition table.
pub fn table() -> Vec<Transition<ServiceLifecycle, LifecycleAction>> {
    vec![
        Transition {
            action: "create",
            from: Source::None,
            to: DRAFT,
            run: create,
        },
        Transition {
            action: "edit",
            from: Source::State(DRAFT),
            to: DRAFT,
            run: edit,
        },
        Transition {
            action: "edit",
            from: Source::State(REJECTED),
            to: DRAFT,
            run: edit,
        },
        Transition {
            action: "edit",
            from: Source::State(APPROVED),
            to: DRAFT,
            run: edit,
        },
        Transition {
            action: "delete",
            from: Source::State(DRAFT),
            to: DELETED,
            run: delete,
        },
        Transition {
            action: "delete",
            from: Source::State(REJECTED),
            to: DELETED,
            run: delete,
        },
        Transition {
            action: "delete",
            from: Source::State(APPROVED),
            to: DELETED,
            run: delete,
        },
        Transition {
            action: "submit",
            from: Source::State(DRAFT),
            to: SUBMITTED,
            run: submit,
        },
        Transition {
            action: "abort",
            from: Source::State(SUBMITTED),
            to: DRAFT,
            run: abort,
        },
        Transition {
            action: "approve",
            from: Source::State(SUBMITTED),
            to: APPROVED,
            run: approve,
        },
        Transition {
            action: "reject",
            from: Source::State(SUBMITTED),
            to: REJECTED,
            run: reject,
        },
    ]
}

/// Pre-bound lifecycle API over a store.
pub struct Lifecycle {
    machine: Machine<ServiceLifecycle, LifecycleAction>,
    store: Arc<dyn Store<ServiceLifecycle>>,
}

impl Lifecycle {
    /// Bind the lifecycle machine to a store, validating the table.
    pub fn new(store: Arc<dyn Store<ServiceLifecycle>>) -> Result<Self, DefinitionError> {
        Ok(Self {
            machine: Machine::validated(table())?,
            store,
        })
    }

    pub async fn create(
        &self,
        id: &str,
        data: ServiceData,
    ) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.apply(id, LifecycleAction::Create { data }).await
    }

    pub async fn edit(
        &self,
        id: &str,
        data: ServiceData,
    ) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.apply(id, LifecycleAction::Edit { data }).await
    }

    pub async fn submit(
        &self,
        id: &str,
        auto_publish: bool,
    ) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.apply(id, LifecycleAction::Submit { auto_publish }).await
    }

    pub async fn abort(&self, id: &str) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.apply(id, LifecycleAction::Abort).await
    }

    pub async fn approve(
        &self,
        id: &str,
        approval_date: DateTime<Utc>,
    ) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.apply(id, LifecycleAction::Approve { approval_date })
            .await
    }

    pub async fn reject(
        &self,
        id: &str,
        reason: impl Into<String>,
    ) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.apply(
            id,
            LifecycleAction::Reject {
                reason: reason.into(),
            },
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.apply(id, LifecycleAction::Delete).await
    }

    /// Replace the stored record unconditionally (legacy-sync path).
    pub async fn override_record(
        &self,
        id: &str,
        record: Record<ServiceLifecycle>,
    ) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.machine
            .override_record(self.store.as_ref(), id, record)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Record<ServiceLifecycle>>, FsmError> {
        self.store.fetch(id).await.map_err(FsmError::StoreFetch)
    }

    pub async fn get_many(
        &self,
        ids: &[String],
    ) -> Result<Vec<Option<Record<ServiceLifecycle>>>, FsmError> {
        self.store
            .bulk_fetch(ids)
            .await
            .map_err(FsmError::StoreFetch)
    }

    async fn apply(
        &self,
        id: &str,
        action: LifecycleAction,
    ) -> Result<Record<ServiceLifecycle>, FsmError> {
        self.machine.apply(self.store.as_ref(), id, &action).await
    }
}
