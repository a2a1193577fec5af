//! Import aggregation over the resolved sibling set.

use fleetmesh_types::ExportRecord;
use fleetmesh_types::ImportRecord;

use super::resolve::select_winner;

/// Compute the import record for a service name from its sibling set.
///
/// Contributors are the records holding a NoConflict verdict for their
/// current generation. Ports and type come from the winning contributor
/// (same total order as conflict resolution); `member_clusters` is the
/// sorted contributor set. Returns `None` when there are no contributors,
/// which callers translate into deleting the import record.
pub fn aggregate_import(namespace: &str, service: &str, records: &[ExportRecord]) -> Option<ImportRecord> {
    let contributors: Vec<ExportRecord> = records
        .iter()
        .filter(|r| r.is_resolved_no_conflict())
        .cloned()
        .collect();

    let winner = select_winner(&contributors)?;

    let mut member_clusters: Vec<String> = contributors.iter().map(|r| r.cluster_id.clone()).collect();
    member_clusters.sort();

    Some(ImportRecord {
        service_name: service.to_string(),
        namespace: namespace.to_string(),
        ports: winner.spec.ports.clone(),
        service_type: winner.spec.service_type,
        member_clusters,
    })
}
