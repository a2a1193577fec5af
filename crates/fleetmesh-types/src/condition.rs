//! Member-visible status conditions.
//!
//! The wire shape of [`Condition`] is consumed by downstream tooling reading
//! condition history; field names must stay exactly as they are.

use serde::Deserialize;
use serde::Serialize;

/// Condition type for export conflict reporting.
pub const CONDITION_TYPE_CONFLICT: &str = "Conflict";

/// Reason when a sibling export with an incompatible spec won resolution.
pub const REASON_CONFLICT_FOUND: &str = "ConflictFound";

/// Reason when the export spec matches the winning definition.
pub const REASON_NO_CONFLICT_FOUND: &str = "NoConflictFound";

/// Reason while a generation has not been resolved yet.
pub const REASON_PENDING_RESOLUTION: &str = "PendingConflictResolution";

/// Reason for structurally invalid export specs. Terminal: retrying cannot
/// fix bad input, only a new generation can.
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";

/// Tri-state condition status, serialized exactly as consumers expect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// A single status condition on a member-visible object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    /// Condition type, e.g. `"Conflict"`.
    #[serde(rename = "type")]
    pub condition_type: String,
    /// True, False or Unknown.
    pub status: ConditionStatus,
    /// Machine-readable reason for the last transition.
    pub reason: String,
    /// Human-readable diagnostic message.
    pub message: String,
    /// Generation of the owning object's spec this condition was computed
    /// against.
    #[serde(rename = "observedGeneration")]
    pub observed_generation: u64,
    /// Unix milliseconds of the last `status` change.
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: u64,
}

impl Condition {
    /// Semantic equality: same type, status and reason.
    ///
    /// Message, observed generation and transition time are deliberately
    /// ignored; this is the check that keeps repeated reconciliation from
    /// producing resource-version churn.
    pub fn semantically_equal(&self, other: &Condition) -> bool {
        self.condition_type == other.condition_type && self.status == other.status && self.reason == other.reason
    }
}
