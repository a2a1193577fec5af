//! Hub-side per-member export records and their conflict status.

use serde::Deserialize;
use serde::Serialize;

use crate::condition::REASON_CONFLICT_FOUND;
use crate::condition::REASON_INVALID_SPEC;
use crate::condition::REASON_NO_CONFLICT_FOUND;
use crate::condition::REASON_PENDING_RESOLUTION;
use crate::export::ExportSpec;

/// Outcome of comparing sibling export definitions for a service name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConflictVerdict {
    /// No resolution attempt has observed this generation yet.
    Unknown,
    /// The spec matches the winning definition.
    NoConflict,
    /// The spec is incompatible with the winning definition, or invalid.
    Conflict,
}

/// Conflict verdict attached to a per-member export record.
///
/// `observed_generation` never decreases: the resolver only writes statuses
/// computed against the record's current generation, and a new generation
/// resets the verdict to Unknown until re-evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictStatus {
    pub verdict: ConflictVerdict,
    pub observed_generation: u64,
    pub reason: String,
    pub message: String,
    pub last_transition_ms: u64,
}

impl ConflictStatus {
    /// Pre-resolution status for a freshly written or re-specced record.
    pub fn pending(namespace: &str, name: &str, generation: u64, now_ms: u64) -> Self {
        Self {
            verdict: ConflictVerdict::Unknown,
            observed_generation: generation,
            reason: REASON_PENDING_RESOLUTION.to_string(),
            message: format!("service {namespace}/{name} is pending export conflict resolution"),
            last_transition_ms: now_ms,
        }
    }

    /// Status for a record whose spec matches the winning definition.
    pub fn no_conflict(namespace: &str, name: &str, generation: u64, now_ms: u64) -> Self {
        Self {
            verdict: ConflictVerdict::NoConflict,
            observed_generation: generation,
            reason: REASON_NO_CONFLICT_FOUND.to_string(),
            message: format!("service {namespace}/{name} is exported without conflict"),
            last_transition_ms: now_ms,
        }
    }

    /// Status for a record that lost resolution to `winner_cluster`.
    pub fn conflict(namespace: &str, name: &str, winner_cluster: &str, generation: u64, now_ms: u64) -> Self {
        Self {
            verdict: ConflictVerdict::Conflict,
            observed_generation: generation,
            reason: REASON_CONFLICT_FOUND.to_string(),
            message: format!(
                "service {namespace}/{name} is in conflict with other exported services (winning export from cluster {winner_cluster})"
            ),
            last_transition_ms: now_ms,
        }
    }

    /// Terminal status for a structurally invalid spec.
    pub fn invalid_spec(namespace: &str, name: &str, detail: &str, generation: u64, now_ms: u64) -> Self {
        Self {
            verdict: ConflictVerdict::Conflict,
            observed_generation: generation,
            reason: REASON_INVALID_SPEC.to_string(),
            message: format!("service {namespace}/{name} has an invalid export spec: {detail}"),
            last_transition_ms: now_ms,
        }
    }

    /// Semantic equality: same verdict, reason and observed generation.
    ///
    /// The transition timestamp is ignored so that recomputation with
    /// unchanged inputs is a no-op write.
    pub fn semantically_equal(&self, other: &ConflictStatus) -> bool {
        self.verdict == other.verdict
            && self.reason == other.reason
            && self.observed_generation == other.observed_generation
    }
}

/// The hub's mirror of one member's export intent.
///
/// One record exists per (cluster, namespace, service name). The spec half is
/// owned by the export intent reconciler, the `conflict` half by the conflict
/// resolver; both mutate the record through CAS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportRecord {
    pub cluster_id: String,
    pub namespace: String,
    pub service_name: String,
    /// Generation of the member intent this record mirrors.
    pub generation: u64,
    /// When the hub first saw this export. First writer wins tie-breaks.
    pub created_at_ms: u64,
    pub spec: ExportSpec,
    /// Reachable addresses mirrored from the member for endpoint fan-out.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Absent until the first resolution attempt or spec write completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictStatus>,
}

impl ExportRecord {
    /// Whether this record currently holds a NoConflict verdict for its
    /// current generation.
    pub fn is_resolved_no_conflict(&self) -> bool {
        match &self.conflict {
            Some(status) => {
                status.verdict == ConflictVerdict::NoConflict && status.observed_generation == self.generation
            }
            None => false,
        }
    }
}
