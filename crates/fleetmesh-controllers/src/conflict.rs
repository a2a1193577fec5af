//! Hub-side conflict resolver.
//!
//! Scans the sibling set for one service name, computes a verdict for
//! every record through [`crate::pure::resolve_verdicts`], and CAS-writes
//! the verdicts that changed. Verdict writes are observed-generation
//! monotonic: a verdict computed against an older generation never
//! overwrites one for a newer generation.

use std::sync::Arc;
use std::time::Duration;

use fleetmesh_store::CAS_RETRY_INITIAL_BACKOFF_MS;
use fleetmesh_store::CAS_RETRY_MAX_BACKOFF_MS;
use fleetmesh_store::ClusterStore;
use fleetmesh_store::MAX_CAS_RETRIES;
use fleetmesh_store::ScanRequest;
use fleetmesh_store::StoreError;
use fleetmesh_types::ExportRecord;
use fleetmesh_types::keys;
use fleetmesh_types::now_unix_ms;
use tracing::debug;
use tracing::warn;

use crate::constants::MAX_SIBLING_RECORDS;
use crate::constants::RESOLVE_RETRY_INTERVAL_MS;
use crate::error::ControllerError;
use crate::objects::cas_raw;
use crate::objects::read_json;
use crate::objects::to_raw;
use crate::pure::VerdictAssignment;
use crate::pure::resolve_verdicts;
use crate::trigger::Trigger;
use crate::trigger::TriggerSink;

/// Resolves conflicts among sibling export records on the hub.
pub struct ConflictResolver<S: ClusterStore + ?Sized> {
    hub: Arc<S>,
    sink: Arc<dyn TriggerSink>,
}

impl<S: ClusterStore + ?Sized + 'static> ConflictResolver<S> {
    pub fn new(hub: Arc<S>, sink: Arc<dyn TriggerSink>) -> Self {
        Self { hub, sink }
    }

    /// Resolve the sibling set for `{namespace}/{service}`.
    ///
    /// Records whose stored status already matches the computed verdict are
    /// left untouched. Every changed verdict kicks the import aggregator,
    /// the owning member's status report, and that member's endpoint
    /// fan-out.
    pub async fn reconcile(&self, namespace: &str, service: &str) -> Result<(), ControllerError> {
        let prefix = keys::export_records_prefix(namespace, service);
        let scan = self
            .hub
            .scan(ScanRequest::new(&prefix).with_limit(MAX_SIBLING_RECORDS))
            .await?;
        if scan.is_truncated {
            warn!(namespace, service, count = scan.count, "sibling scan truncated");
        }

        let mut records: Vec<ExportRecord> = Vec::with_capacity(scan.entries.len());
        for entry in &scan.entries {
            let record: ExportRecord =
                serde_json::from_str(&entry.value).map_err(|e| ControllerError::CorruptedObject {
                    key: entry.key.clone(),
                    reason: e.to_string(),
                })?;
            records.push(record);
        }

        if records.is_empty() {
            // Last sibling withdrawn; make sure the import aggregate follows.
            self.sink.enqueue(Trigger::AggregateImport {
                namespace: namespace.to_string(),
                service: service.to_string(),
            });
            return Ok(());
        }

        let assignments = resolve_verdicts(&records, now_unix_ms());

        let mut changed_clusters: Vec<String> = Vec::new();
        for assignment in &assignments {
            if self.apply_assignment(namespace, service, assignment).await? {
                changed_clusters.push(assignment.cluster_id.clone());
            }
        }

        if !changed_clusters.is_empty() {
            debug!(namespace, service, changed = changed_clusters.len(), "verdicts updated");
            self.sink.enqueue(Trigger::AggregateImport {
                namespace: namespace.to_string(),
                service: service.to_string(),
            });
            for cluster_id in changed_clusters {
                self.sink.enqueue(Trigger::ReportStatus {
                    cluster_id: cluster_id.clone(),
                    namespace: namespace.to_string(),
                    service: service.to_string(),
                });
                self.sink.enqueue(Trigger::PropagateEndpoints {
                    namespace: namespace.to_string(),
                    service: service.to_string(),
                    source_cluster: cluster_id,
                });
            }
        }
        Ok(())
    }

    /// Write one verdict onto its record. Returns whether a write happened.
    async fn apply_assignment(
        &self,
        namespace: &str,
        service: &str,
        assignment: &VerdictAssignment,
    ) -> Result<bool, ControllerError> {
        let key = keys::export_record_key(namespace, service, &assignment.cluster_id);

        let mut attempt = 0u32;
        let mut backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;

        loop {
            let obj = match read_json::<S, ExportRecord>(&self.hub, &key).await? {
                Some(obj) => obj,
                // Withdrawn between scan and write; the deletion's own
                // trigger re-resolves the remaining siblings.
                None => return Ok(false),
            };
            let record = &obj.value;

            if record.generation != assignment.status.observed_generation {
                // Re-exported at a newer generation since the scan; a fresh
                // resolve trigger is already queued for it.
                return Ok(false);
            }
            if let Some(existing) = &record.conflict {
                if existing.observed_generation > assignment.status.observed_generation {
                    return Ok(false);
                }
                if existing.semantically_equal(&assignment.status) {
                    return Ok(false);
                }
            }

            let mut updated = record.clone();
            updated.conflict = Some(assignment.status.clone());
            let raw = to_raw(&updated)?;

            match cas_raw(&self.hub, &key, Some(obj.raw), raw).await {
                Ok(()) => {
                    debug!(
                        namespace,
                        service,
                        cluster = %assignment.cluster_id,
                        verdict = ?assignment.status.verdict,
                        reason = %assignment.status.reason,
                        "verdict written"
                    );
                    return Ok(true);
                }
                Err(StoreError::CompareAndSwapFailed { .. }) => {
                    attempt += 1;
                    if attempt >= MAX_CAS_RETRIES {
                        self.sink.requeue(
                            Trigger::ResolveConflicts {
                                namespace: namespace.to_string(),
                                service: service.to_string(),
                            },
                            Duration::from_millis(RESOLVE_RETRY_INTERVAL_MS),
                        );
                        return Err(ControllerError::MaxRetriesExceeded {
                            operation: format!("resolve {namespace}/{service} for {}", assignment.cluster_id),
                            attempts: attempt,
                        });
                    }
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(CAS_RETRY_MAX_BACKOFF_MS);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetmesh_store::DeterministicClusterStore;
    use fleetmesh_store::WriteCommand;
    use fleetmesh_store::WriteRequest;
    use fleetmesh_types::ConflictStatus;
    use fleetmesh_types::ConflictVerdict;
    use fleetmesh_types::ExportSpec;
    use fleetmesh_types::Protocol;
    use fleetmesh_types::ServicePort;
    use fleetmesh_types::ServiceType;

    use crate::trigger::RecordingTriggerSink;

    fn spec(port: u16) -> ExportSpec {
        ExportSpec {
            ports: vec![ServicePort {
                name: None,
                protocol: Protocol::Tcp,
                port,
                target_port: None,
            }],
            service_type: ServiceType::ClusterSetIP,
        }
    }

    fn record(cluster: &str, created_at_ms: u64, spec: ExportSpec) -> ExportRecord {
        ExportRecord {
            cluster_id: cluster.to_string(),
            namespace: "work".to_string(),
            service_name: "app".to_string(),
            generation: 1,
            created_at_ms,
            spec,
            endpoints: vec![],
            conflict: Some(ConflictStatus::pending("work", "app", 1, created_at_ms)),
        }
    }

    async fn put_record(hub: &DeterministicClusterStore, record: &ExportRecord) {
        let key = keys::export_record_key(&record.namespace, &record.service_name, &record.cluster_id);
        hub.write(WriteRequest::put(key, serde_json::to_string(record).unwrap()))
            .await
            .unwrap();
    }

    async fn get_record(hub: &DeterministicClusterStore, cluster: &str) -> ExportRecord {
        read_json::<DeterministicClusterStore, ExportRecord>(hub, &keys::export_record_key("work", "app", cluster))
            .await
            .unwrap()
            .unwrap()
            .value
    }

    fn resolver(
        hub: &Arc<DeterministicClusterStore>,
        sink: &Arc<RecordingTriggerSink>,
    ) -> ConflictResolver<DeterministicClusterStore> {
        ConflictResolver::new(hub.clone(), sink.clone())
    }

    #[tokio::test]
    async fn earliest_export_wins_and_later_conflicts() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &record("east", 100, spec(80))).await;
        put_record(&hub, &record("west", 200, spec(9090))).await;

        resolver(&hub, &sink).reconcile("work", "app").await.unwrap();

        let east = get_record(&hub, "east").await.conflict.unwrap();
        assert_eq!(east.verdict, ConflictVerdict::NoConflict);
        let west = get_record(&hub, "west").await.conflict.unwrap();
        assert_eq!(west.verdict, ConflictVerdict::Conflict);
        assert!(west.message.contains("east"));
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &record("east", 100, spec(80))).await;
        put_record(&hub, &record("west", 200, spec(9090))).await;

        let r = resolver(&hub, &sink);
        r.reconcile("work", "app").await.unwrap();
        sink.drain();

        let east_key = keys::export_record_key("work", "app", "east");
        let west_key = keys::export_record_key("work", "app", "west");
        let east_rev = hub.mod_revision(&east_key).await.unwrap();
        let west_rev = hub.mod_revision(&west_key).await.unwrap();

        r.reconcile("work", "app").await.unwrap();

        assert_eq!(hub.mod_revision(&east_key).await.unwrap(), east_rev);
        assert_eq!(hub.mod_revision(&west_key).await.unwrap(), west_rev);
        assert!(sink.drain().is_empty());
    }

    #[tokio::test]
    async fn changed_verdicts_trigger_downstream_reconcilers() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &record("east", 100, spec(80))).await;

        resolver(&hub, &sink).reconcile("work", "app").await.unwrap();

        let triggers = sink.drain();
        assert!(triggers.iter().any(|t| matches!(t, Trigger::AggregateImport { .. })));
        assert!(triggers
            .iter()
            .any(|t| matches!(t, Trigger::ReportStatus { cluster_id, .. } if cluster_id == "east")));
        assert!(triggers
            .iter()
            .any(|t| matches!(t, Trigger::PropagateEndpoints { source_cluster, .. } if source_cluster == "east")));
    }

    #[tokio::test]
    async fn stale_verdict_never_overwrites_newer_generation() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());

        // Record already re-exported at generation 3 with a resolved verdict.
        let mut r = record("east", 100, spec(80));
        r.generation = 3;
        r.conflict = Some(ConflictStatus::no_conflict("work", "app", 3, 500));
        put_record(&hub, &r).await;

        let resolver = ConflictResolver::new(hub.clone(), sink.clone());
        let stale = VerdictAssignment {
            cluster_id: "east".to_string(),
            status: ConflictStatus::conflict("work", "app", "west", 2, 400),
        };
        let changed = resolver.apply_assignment("work", "app", &stale).await.unwrap();

        assert!(!changed);
        let stored = get_record(&hub, "east").await.conflict.unwrap();
        assert_eq!(stored.observed_generation, 3);
        assert_eq!(stored.verdict, ConflictVerdict::NoConflict);
    }

    #[tokio::test]
    async fn empty_sibling_set_requests_import_cleanup() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());

        resolver(&hub, &sink).reconcile("work", "app").await.unwrap();

        let triggers = sink.drain();
        assert_eq!(triggers.len(), 1);
        assert!(matches!(&triggers[0], Trigger::AggregateImport { .. }));
    }

    #[tokio::test]
    async fn corrupted_sibling_surfaces_an_error() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        hub.write(WriteRequest::put(
            keys::export_record_key("work", "app", "east"),
            "not json".to_string(),
        ))
        .await
        .unwrap();

        let err = resolver(&hub, &sink).reconcile("work", "app").await.unwrap_err();
        assert!(matches!(err, ControllerError::CorruptedObject { .. }));
    }

    /// Store whose writes always lose the compare-and-swap race.
    struct ContendedStore {
        inner: Arc<DeterministicClusterStore>,
    }

    #[async_trait::async_trait]
    impl ClusterStore for ContendedStore {
        async fn read(&self, request: fleetmesh_store::ReadRequest) -> Result<fleetmesh_store::ReadResult, StoreError> {
            self.inner.read(request).await
        }

        async fn write(&self, request: WriteRequest) -> Result<fleetmesh_store::WriteResult, StoreError> {
            let key = match request.command {
                WriteCommand::Put { key, .. } => key,
                WriteCommand::CompareAndSwap { key, .. } => key,
                WriteCommand::Delete { key } => key,
            };
            Err(StoreError::CompareAndSwapFailed {
                key,
                expected: None,
                actual: None,
            })
        }

        async fn delete(
            &self,
            request: fleetmesh_store::DeleteRequest,
        ) -> Result<fleetmesh_store::DeleteResult, StoreError> {
            self.inner.delete(request).await
        }

        async fn scan(&self, request: ScanRequest) -> Result<fleetmesh_store::ScanResult, StoreError> {
            self.inner.scan(request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cas_exhaustion_fails_and_requeues_the_resolution() {
        let inner = DeterministicClusterStore::new();
        put_record(&inner, &record("east", 100, spec(80))).await;
        let hub: Arc<dyn ClusterStore> = Arc::new(ContendedStore { inner });
        let sink = Arc::new(RecordingTriggerSink::new());

        let r = ConflictResolver::new(hub, sink.clone());
        let err = r.reconcile("work", "app").await.unwrap_err();

        assert!(matches!(
            err,
            ControllerError::MaxRetriesExceeded { attempts, .. } if attempts == MAX_CAS_RETRIES
        ));
        let requeued = sink.drain_requeued();
        assert_eq!(requeued.len(), 1);
        assert!(matches!(&requeued[0].0, Trigger::ResolveConflicts { .. }));
        assert_eq!(requeued[0].1, Duration::from_millis(RESOLVE_RETRY_INTERVAL_MS));
    }
}
