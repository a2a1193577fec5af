//! Deterministic conflict resolution over a sibling set.

use fleetmesh_types::ConflictStatus;
use fleetmesh_types::ExportRecord;
use fleetmesh_types::validate_export_spec;

/// The status one sibling record should carry after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdictAssignment {
    /// Cluster whose record this assignment applies to.
    pub cluster_id: String,
    /// The computed status, observed at the record's current generation.
    pub status: ConflictStatus,
}

/// Select the winning export definition among siblings.
///
/// Total order: earliest `created_at_ms` first, lexicographic `cluster_id`
/// as the tie-break — first writer wins. Records with invalid specs are
/// never eligible. Returns `None` when no sibling has a valid spec.
///
/// The order is deliberately independent of input order, so repeated
/// resolution over an unchanged sibling set can never flap.
pub fn select_winner(records: &[ExportRecord]) -> Option<&ExportRecord> {
    records
        .iter()
        .filter(|r| validate_export_spec(&r.spec).is_ok())
        .min_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.cluster_id.cmp(&b.cluster_id))
        })
}

/// Compute a verdict for every sibling record sharing a service name.
///
/// - records whose spec is structurally equal to the winner's are NoConflict;
/// - all other valid records are Conflict, naming the winning cluster;
/// - records with invalid specs get a terminal `InvalidSpec` Conflict.
///
/// The function is total and deterministic over the sibling set: the same
/// records always produce the same assignment, regardless of slice order.
/// Output is parallel to the input slice.
pub fn resolve_verdicts(records: &[ExportRecord], now_ms: u64) -> Vec<VerdictAssignment> {
    let winner = select_winner(records);

    records
        .iter()
        .map(|record| {
            let namespace = record.namespace.as_str();
            let name = record.service_name.as_str();

            let status = if let Err(violation) = validate_export_spec(&record.spec) {
                ConflictStatus::invalid_spec(namespace, name, &violation.to_string(), record.generation, now_ms)
            } else {
                // A winner exists whenever this record's own spec is valid.
                match winner {
                    Some(winner) if winner.spec == record.spec => {
                        ConflictStatus::no_conflict(namespace, name, record.generation, now_ms)
                    }
                    Some(winner) => {
                        ConflictStatus::conflict(namespace, name, &winner.cluster_id, record.generation, now_ms)
                    }
                    None => ConflictStatus::invalid_spec(
                        namespace,
                        name,
                        "no valid sibling export",
                        record.generation,
                        now_ms,
                    ),
                }
            };

            VerdictAssignment {
                cluster_id: record.cluster_id.clone(),
                status,
            }
        })
        .collect()
}
