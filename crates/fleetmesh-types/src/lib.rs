//! Shared data model for fleet service export/import state.
//!
//! Every object here is persisted as a JSON document in a cluster store:
//! export intents live in member clusters, per-member export records and
//! import records live in the hub, endpoint snapshots are fanned out to
//! member clusters. The [`keys`] module defines the canonical key layout;
//! the sibling set for a service name is a single prefix scan.

pub mod condition;
pub mod endpoints;
pub mod export;
pub mod import;
pub mod keys;
pub mod record;

pub use condition::CONDITION_TYPE_CONFLICT;
pub use condition::Condition;
pub use condition::ConditionStatus;
pub use condition::REASON_CONFLICT_FOUND;
pub use condition::REASON_INVALID_SPEC;
pub use condition::REASON_NO_CONFLICT_FOUND;
pub use condition::REASON_PENDING_RESOLUTION;
pub use endpoints::EndpointSnapshot;
pub use export::ExportIntent;
pub use export::ExportSpec;
pub use export::ExportStatus;
pub use export::Protocol;
pub use export::ServicePort;
pub use export::ServiceType;
pub use export::SpecError;
pub use export::validate_export_spec;
pub use import::ImportRecord;
pub use keys::validate_object_name;
pub use record::ConflictStatus;
pub use record::ConflictVerdict;
pub use record::ExportRecord;

/// Get current Unix timestamp in milliseconds.
///
/// Returns 0 if system time is before UNIX epoch (should never happen on
/// properly configured systems, but prevents panics).
#[inline]
pub fn now_unix_ms() -> u64 {
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
