//! Cross-cluster conflict-resolution and status-convergence engine.
//!
//! Five reconcilers cooperate through cluster stores, never through direct
//! calls:
//!
//! - [`ExportIntentReconciler`] (member-side) mirrors export intents into
//!   per-member hub records and cleans them up on withdrawal.
//! - [`ConflictResolver`] (hub-side) computes a deterministic verdict for
//!   every sibling record sharing a service name.
//! - [`StatusPropagator`] (member-side) reports the hub verdict back as the
//!   member-visible `Conflict` condition, skipping no-op writes.
//! - [`ImportAggregator`] (hub-side) maintains exactly one import record per
//!   service name with at least one NoConflict contributor.
//! - [`EndpointPropagator`] fans endpoint snapshots out to importing members.
//!
//! Reconciliation is level-triggered and idempotent: every run re-reads the
//! full current state for its key and converges to the same observable state
//! no matter how often it is invoked. All mutation goes through
//! compare-and-swap writes against the [`fleetmesh_store::ClusterStore`]
//! trait; stale writes fail cleanly and are retried against fresh state.
//!
//! The hard logic lives in [`pure`]: deterministic, side-effect-free
//! functions over the current sibling set, unit-testable without a store.

pub mod conflict;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod export;
pub mod import;
mod objects;
pub mod pure;
pub mod status;
pub mod trigger;

pub use conflict::ConflictResolver;
pub use constants::ENDPOINT_RETRY_INTERVAL_MS;
pub use constants::MAX_SIBLING_RECORDS;
pub use constants::RESOLVE_RETRY_INTERVAL_MS;
pub use endpoints::EndpointPropagator;
pub use error::ControllerError;
pub use export::ExportIntentReconciler;
pub use import::ImportAggregator;
pub use pure::VerdictAssignment;
pub use pure::aggregate_import;
pub use pure::resolve_verdicts;
pub use status::StatusPropagator;
pub use trigger::RecordingTriggerSink;
pub use trigger::Trigger;
pub use trigger::TriggerSink;
