//! Catalogue state machines for a public-sector digital-services register.
//!
//! Two machines built on the [`fsm`] engine share one wire envelope
//! (`{ "data": ..., "fsm": ... }`) but own separate documents:
//!
//! - [`lifecycle`] moves editorial content through
//!   `draft -> submitted -> approved | rejected` with `deleted` as the
//!   terminal state.
//! - [`publication`] controls the public `published | unpublished` toggle,
//!   fed by the lifecycle side via [`publication::Publisher::release`].
//!
//! Both expose a facade ([`lifecycle::Lifecycle`], [`publication::Publisher`])
//! that binds a validated transition table to a [`fsm::Store`]. Everything
//! here is storage-agnostic; production wires the facades to a
//! [`fsm::DocumentStore`] over the document database client.

pub mod lifecycle;
pub mod publication;
pub mod service;

pub use lifecycle::{Lifecycle, LifecycleAction, ServiceLifecycle};
pub use publication::{Publication, PublicationAction, Publisher};
pub use service::ServiceData;
