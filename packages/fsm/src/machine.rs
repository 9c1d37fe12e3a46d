//! The transition matcher/executor.
//!
//! A [`Machine`] is a pure definition: an ordered transition table and
//! nothing else. Stores are passed in per call, so one definition can serve
//! any number of backends (tests run the same table against the in-memory
//! store that production runs against the document store).
//!
//! # Guarantees
//!
//! - Exactly one transition executes per `apply` call. "No transition" and
//!   "more than one transition" are distinguishable failure modes.
//! - A transition that reports no changes produces no store write.
//! - Every persisted record is normalized and stamped with an audit string
//!   `"apply <action> on <prior state>"` before the write.

use smallvec::SmallVec;
use tracing::debug;

use crate::error::FsmError;
use crate::record::{Action, MachineState, Record, EMPTY_SOURCE};
use crate::store::Store;
use crate::transition::{validate_table, DefinitionError, Transition};

/// A machine definition: an ordered, fixed transition table.
pub struct Machine<S, A> {
    transitions: Vec<Transition<S, A>>,
}

// Manual impl to avoid bounds on S and A, same as Transition's.
impl<S, A> std::fmt::Debug for Machine<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("transitions", &self.transitions)
            .finish()
    }
}

impl<S: MachineState, A: Action> Machine<S, A> {
    /// Build a machine without validating the table.
    ///
    /// An ambiguous table will surface as `TooManyTransitions` at runtime.
    /// Prefer [`Machine::validated`] outside of tests.
    pub fn new(transitions: Vec<Transition<S, A>>) -> Self {
        Self { transitions }
    }

    /// Build a machine, rejecting empty or ambiguous tables up front.
    pub fn validated(transitions: Vec<Transition<S, A>>) -> Result<Self, DefinitionError> {
        validate_table(&transitions)?;
        Ok(Self { transitions })
    }

    pub fn transitions(&self) -> &[Transition<S, A>] {
        &self.transitions
    }

    /// Apply an action to the record stored under `id`.
    ///
    /// Fetches the current record, selects the single transition legal for
    /// (action, current state), runs its pure computation, and persists the
    /// result unless the transition reported no changes.
    pub async fn apply(
        &self,
        store: &dyn Store<S>,
        id: &str,
        action: &A,
    ) -> Result<Record<S>, FsmError> {
        let current = store.fetch(id).await.map_err(FsmError::StoreFetch)?;

        let for_action: SmallVec<[&Transition<S, A>; 4]> = self
            .transitions
            .iter()
            .filter(|t| t.action == action.name())
            .collect();
        if for_action.is_empty() {
            return Err(FsmError::NoApplicableTransition {
                action: action.name(),
            });
        }

        let current_tag = current.as_ref().map(|record| record.state.tag());
        let matched: SmallVec<[&Transition<S, A>; 2]> = for_action
            .iter()
            .copied()
            .filter(|t| t.from.matches(current_tag))
            .collect();

        let transition = match (matched.len(), current_tag) {
            // The action exists but every matching transition needs a record.
            (0, None) => {
                return Err(FsmError::ItemNotFound { id: id.to_string() });
            }
            (0, Some(state)) => {
                return Err(FsmError::NoTransitionMatched {
                    action: action.name(),
                    state,
                });
            }
            (1, _) => matched[0],
            (count, state) => {
                return Err(FsmError::TooManyTransitions {
                    action: action.name(),
                    state: state.unwrap_or(EMPTY_SOURCE),
                    count,
                });
            }
        };

        let applied =
            (transition.run)(current.as_ref(), action).map_err(|source| {
                FsmError::TransitionExecution {
                    action: action.name(),
                    source,
                }
            })?;

        let prior = current_tag.unwrap_or(EMPTY_SOURCE);
        if !applied.changed {
            debug!(action = action.name(), id, state = prior, "no changes, skipping save");
            return Ok(applied.record);
        }

        let mut record = applied.record.normalized();
        record.last_transition = Some(format!("apply {} on {}", action.name(), prior));
        debug!(
            action = action.name(),
            id,
            from = prior,
            to = transition.to,
            "applying transition"
        );
        store.save(id, record).await.map_err(FsmError::StoreSave)
    }

    /// Replace the record under `id` unconditionally, skipping the matcher.
    ///
    /// Last-writer-wins escape hatch for synchronization from a legacy system
    /// of record and for reconciling duplicate event delivery. Any existing
    /// document must still decode against the machine's state shapes; an
    /// undecodable document rejects the write. No transition-legality check
    /// is made, so callers can reach states no transition produces — the
    /// price of idempotent sync, and the reason this path carries its own
    /// audit marker ([`crate::LEGACY_SYNC`]).
    pub async fn override_record(
        &self,
        store: &dyn Store<S>,
        id: &str,
        record: Record<S>,
    ) -> Result<Record<S>, FsmError> {
        let prior = store.fetch(id).await.map_err(FsmError::StoreFetch)?;
        debug!(
            id,
            prior = prior.as_ref().map(|r| r.state.tag()).unwrap_or(EMPTY_SOURCE),
            next = record.state.tag(),
            "overriding record"
        );
        store
            .save(id, record.normalized())
            .await
            .map_err(FsmError::StoreSave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::record::DecodeError;
    use crate::transition::{Applied, ExecFailure, Source};
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    // Toy review machine: open -> resolved, open -> discarded.

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase", tag = "state")]
    enum Ticket {
        Open { title: String },
        Resolved { title: String },
        Discarded,
    }

    #[derive(Serialize, Deserialize)]
    struct TicketDoc {
        #[serde(flatten)]
        state: Ticket,
        #[serde(rename = "lastTransition", skip_serializing_if = "Option::is_none")]
        last_transition: Option<String>,
    }

    impl MachineState for Ticket {
        fn tag(&self) -> &'static str {
            match self {
                Ticket::Open { .. } => "open",
                Ticket::Resolved { .. } => "resolved",
                Ticket::Discarded => "discarded",
            }
        }

        fn decode_record(doc: &Value) -> Result<Record<Self>, DecodeError> {
            let doc: TicketDoc = serde_json::from_value(doc.clone())?;
            Ok(Record {
                state: doc.state,
                last_transition: doc.last_transition,
            })
        }

        fn encode_record(record: &Record<Self>) -> Result<Value, serde_json::Error> {
            serde_json::to_value(TicketDoc {
                state: record.state.clone(),
                last_transition: record.last_transition.clone(),
            })
        }

        fn normalize(self) -> Self {
            match self {
                Ticket::Open { title } => Ticket::Open {
                    title: title.trim().to_string(),
                },
                other => other,
            }
        }
    }

    #[derive(Debug)]
    enum TicketAction {
        Open { title: String },
        Resolve,
        Discard,
        Reopen,
    }

    impl Action for TicketAction {
        fn name(&self) -> &'static str {
            match self {
                TicketAction::Open { .. } => "open",
                TicketAction::Resolve => "resolve",
                TicketAction::Discard => "discard",
                TicketAction::Reopen => "reopen",
            }
        }
    }

    fn open(
        _current: Option<&Record<Ticket>>,
        action: &TicketAction,
    ) -> Result<Applied<Ticket>, ExecFailure> {
        let TicketAction::Open { title } = action else {
            return Err(ExecFailure::new("open requires a title"));
        };
        Ok(Applied::changed(Ticket::Open {
            title: title.clone(),
        }))
    }

    fn resolve(
        current: Option<&Record<Ticket>>,
        _action: &TicketAction,
    ) -> Result<Applied<Ticket>, ExecFailure> {
        let Some(Ticket::Open { title }) = current.map(|r| &r.state) else {
            return Err(ExecFailure::new("resolve requires an open ticket"));
        };
        Ok(Applied::changed(Ticket::Resolved {
            title: title.clone(),
        }))
    }

    fn discard(
        current: Option<&Record<Ticket>>,
        _action: &TicketAction,
    ) -> Result<Applied<Ticket>, ExecFailure> {
        // Discarding an already-discarded ticket is the no-op path.
        if let Some(record) = current {
            if record.state == Ticket::Discarded {
                return Ok(Applied::unchanged(record.clone()));
            }
        }
        Ok(Applied::changed(Ticket::Discarded))
    }

    fn explode(
        _current: Option<&Record<Ticket>>,
        _action: &TicketAction,
    ) -> Result<Applied<Ticket>, ExecFailure> {
        Err(ExecFailure::new("boom"))
    }

    fn table() -> Vec<Transition<Ticket, TicketAction>> {
        vec![
            Transition {
                action: "open",
                from: Source::None,
                to: "open",
                run: open,
            },
            Transition {
                action: "resolve",
                from: Source::State("open"),
                to: "resolved",
                run: resolve,
            },
            Transition {
                action: "discard",
                from: Source::State("open"),
                to: "discarded",
                run: discard,
            },
            Transition {
                action: "discard",
                from: Source::State("discarded"),
                to: "discarded",
                run: discard,
            },
        ]
    }

    #[test]
    fn transitions_exposes_the_table() {
        let machine = Machine::validated(table()).unwrap();
        assert_eq!(machine.transitions().len(), 4);
        assert!(format!("{:?}", machine).contains("resolve"));
    }

    #[tokio::test]
    async fn create_from_nothing_then_resolve() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();

        let record = machine
            .apply(
                &store,
                "t-1",
                &TicketAction::Open {
                    title: "stuck queue".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.state.tag(), "open");
        assert_eq!(record.last_transition.as_deref(), Some("apply open on empty"));

        let record = machine
            .apply(&store, "t-1", &TicketAction::Resolve)
            .await
            .unwrap();
        assert_eq!(record.state.tag(), "resolved");
        assert_eq!(
            record.last_transition.as_deref(),
            Some("apply resolve on open")
        );
    }

    #[tokio::test]
    async fn create_twice_is_illegal() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();
        let open_action = || TicketAction::Open {
            title: "dup".to_string(),
        };

        machine.apply(&store, "t-1", &open_action()).await.unwrap();
        let err = machine
            .apply(&store, "t-1", &open_action())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FsmError::NoTransitionMatched {
                action: "open",
                state: "open"
            }
        ));
    }

    #[tokio::test]
    async fn action_requiring_a_record_on_absent_id_is_not_found() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();

        let err = machine
            .apply(&store, "ghost", &TicketAction::Resolve)
            .await
            .unwrap_err();

        assert!(matches!(err, FsmError::ItemNotFound { id } if id == "ghost"));
    }

    #[tokio::test]
    async fn unknown_action_is_no_applicable_transition() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();

        let err = machine
            .apply(&store, "t-1", &TicketAction::Reopen)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FsmError::NoApplicableTransition { action: "reopen" }
        ));
    }

    #[tokio::test]
    async fn duplicated_transition_is_too_many() {
        let mut rows = table();
        rows.push(Transition {
            action: "resolve",
            from: Source::State("open"),
            to: "resolved",
            run: resolve,
        });
        // Deliberately unchecked: `validated` would reject this table.
        let machine = Machine::new(rows);
        let store = MemoryStore::new();

        machine
            .apply(
                &store,
                "t-1",
                &TicketAction::Open {
                    title: "x".to_string(),
                },
            )
            .await
            .unwrap();
        let err = machine
            .apply(&store, "t-1", &TicketAction::Resolve)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FsmError::TooManyTransitions {
                action: "resolve",
                state: "open",
                count: 2
            }
        ));
    }

    #[tokio::test]
    async fn validated_rejects_ambiguous_tables() {
        let mut rows = table();
        rows.push(rows[1]);

        let err = Machine::validated(rows).unwrap_err();
        assert!(matches!(err, DefinitionError::Ambiguous { .. }));
    }

    #[tokio::test]
    async fn exec_failure_is_transition_execution() {
        let machine = Machine::new(vec![Transition {
            action: "open",
            from: Source::None,
            to: "open",
            run: explode,
        }]);
        let store = MemoryStore::new();

        let err = machine
            .apply(
                &store,
                "t-1",
                &TicketAction::Open {
                    title: "x".to_string(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FsmError::TransitionExecution {
                action: "open",
                ..
            }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unchanged_outcome_skips_the_store_write() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();

        machine
            .apply(
                &store,
                "t-1",
                &TicketAction::Open {
                    title: "x".to_string(),
                },
            )
            .await
            .unwrap();
        machine
            .apply(&store, "t-1", &TicketAction::Discard)
            .await
            .unwrap();
        let saves_before = store.saves();

        let record = machine
            .apply(&store, "t-1", &TicketAction::Discard)
            .await
            .unwrap();

        assert_eq!(record.state, Ticket::Discarded);
        assert_eq!(store.saves(), saves_before);
        // The stored audit string still describes the first discard.
        assert_eq!(
            record.last_transition.as_deref(),
            Some("apply discard on open")
        );
    }

    #[tokio::test]
    async fn failed_apply_leaves_the_store_untouched() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();

        machine
            .apply(
                &store,
                "t-1",
                &TicketAction::Open {
                    title: "keep me".to_string(),
                },
            )
            .await
            .unwrap();
        let before = store.inspect("t-1").unwrap();

        machine
            .apply(&store, "t-1", &TicketAction::Reopen)
            .await
            .unwrap_err();

        assert_eq!(store.inspect("t-1").unwrap(), before);
    }

    #[tokio::test]
    async fn saved_records_are_normalized() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();

        let record = machine
            .apply(
                &store,
                "t-1",
                &TicketAction::Open {
                    title: "  padded title  ".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            record.state,
            Ticket::Open {
                title: "padded title".to_string()
            }
        );
    }

    #[tokio::test]
    async fn override_replaces_without_legality_checks() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();

        // "resolved" is unreachable from nothing via transitions; override
        // writes it anyway.
        let record = Record::new(Ticket::Resolved {
            title: "imported".to_string(),
        })
        .mark_legacy_sync();
        let saved = machine
            .override_record(&store, "t-9", record)
            .await
            .unwrap();

        assert!(saved.is_legacy_sync());
        let fetched = store.fetch("t-9").await.unwrap().unwrap();
        assert_eq!(fetched.state.tag(), "resolved");
    }

    #[tokio::test]
    async fn override_rejects_ids_with_undecodable_history() {
        let store = MemoryStore::new();
        let machine = Machine::validated(table()).unwrap();
        store.seed_raw("t-9", json!({ "state": "limbo" }));
        let before = store.inspect("t-9").unwrap();

        let err = machine
            .override_record(&store, "t-9", Record::new(Ticket::Discarded))
            .await
            .unwrap_err();

        assert!(matches!(err, FsmError::StoreFetch(_)));
        assert_eq!(store.inspect("t-9").unwrap(), before);
        assert_eq!(store.saves(), 0);
    }
}
