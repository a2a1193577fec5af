//! Hub-side import aggregator.
//!
//! Derives the single import record for a service name from the resolved
//! sibling set and keeps it converged through CAS. The aggregate itself is
//! computed by [`crate::pure::aggregate_import`].

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fleetmesh_store::CAS_RETRY_INITIAL_BACKOFF_MS;
use fleetmesh_store::CAS_RETRY_MAX_BACKOFF_MS;
use fleetmesh_store::ClusterStore;
use fleetmesh_store::DeleteRequest;
use fleetmesh_store::MAX_CAS_RETRIES;
use fleetmesh_store::ScanRequest;
use fleetmesh_store::StoreError;
use fleetmesh_types::ExportRecord;
use fleetmesh_types::ImportRecord;
use fleetmesh_types::keys;
use tracing::debug;
use tracing::warn;

use crate::constants::MAX_SIBLING_RECORDS;
use crate::constants::RESOLVE_RETRY_INTERVAL_MS;
use crate::error::ControllerError;
use crate::objects::cas_raw;
use crate::objects::read_json;
use crate::objects::to_raw;
use crate::pure::aggregate_import;
use crate::trigger::Trigger;
use crate::trigger::TriggerSink;

/// Maintains the per-service import record on the hub.
pub struct ImportAggregator<S: ClusterStore + ?Sized> {
    hub: Arc<S>,
    sink: Arc<dyn TriggerSink>,
}

impl<S: ClusterStore + ?Sized + 'static> ImportAggregator<S> {
    pub fn new(hub: Arc<S>, sink: Arc<dyn TriggerSink>) -> Self {
        Self { hub, sink }
    }

    /// Converge the import record for `{namespace}/{service}`.
    ///
    /// With no contributing siblings the import record is deleted. Any
    /// membership change kicks the endpoint fan-out for every cluster that
    /// joined or left, so their snapshots are placed or withdrawn.
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

        let desired = aggregate_import(namespace, service, &records);
        let key = keys::import_record_key(namespace, service);

        let mut attempt = 0u32;
        let mut backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;

        loop {
            let existing = read_json::<S, ImportRecord>(&self.hub, &key).await?;

            match (&desired, &existing) {
                (None, None) => return Ok(()),
                (None, Some(obj)) => {
                    self.hub.delete(DeleteRequest::new(&key)).await?;
                    debug!(namespace, service, "no contributors left, import record removed");
                    self.fan_out(namespace, service, &obj.value.member_clusters, &[]);
                    return Ok(());
                }
                (Some(desired), Some(obj)) if obj.value == *desired => return Ok(()),
                (Some(desired), existing) => {
                    let raw = to_raw(desired)?;
                    let expected = existing.as_ref().map(|obj| obj.raw.clone());
                    let previous_members: Vec<String> = existing
                        .as_ref()
                        .map(|obj| obj.value.member_clusters.clone())
                        .unwrap_or_default();

                    match cas_raw(&self.hub, &key, expected, raw).await {
                        Ok(()) => {
                            debug!(
                                namespace,
                                service,
                                members = desired.member_clusters.len(),
                                "import record converged"
                            );
                            self.fan_out(namespace, service, &previous_members, &desired.member_clusters);
                            return Ok(());
                        }
                        Err(StoreError::CompareAndSwapFailed { .. }) => {
                            attempt += 1;
                            if attempt >= MAX_CAS_RETRIES {
                                self.sink.requeue(
                                    Trigger::AggregateImport {
                                        namespace: namespace.to_string(),
                                        service: service.to_string(),
                                    },
                                    Duration::from_millis(RESOLVE_RETRY_INTERVAL_MS),
                                );
                                return Err(ControllerError::MaxRetriesExceeded {
                                    operation: format!("aggregate import {namespace}/{service}"),
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
    }

    /// Kick endpoint propagation for every cluster in either membership set.
    fn fan_out(&self, namespace: &str, service: &str, before: &[String], after: &[String]) {
        let affected: BTreeSet<&String> = before.iter().chain(after.iter()).collect();
        for cluster_id in affected {
            self.sink.enqueue(Trigger::PropagateEndpoints {
                namespace: namespace.to_string(),
                service: service.to_string(),
                source_cluster: cluster_id.clone(),
            });
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

    fn resolved_record(cluster: &str, created_at_ms: u64, spec: ExportSpec) -> ExportRecord {
        ExportRecord {
            cluster_id: cluster.to_string(),
            namespace: "work".to_string(),
            service_name: "app".to_string(),
            generation: 1,
            created_at_ms,
            spec,
            endpoints: vec![],
            conflict: Some(ConflictStatus::no_conflict("work", "app", 1, 1000)),
        }
    }

    async fn put_record(hub: &DeterministicClusterStore, record: &ExportRecord) {
        hub.write(WriteRequest::put(
            keys::export_record_key(&record.namespace, &record.service_name, &record.cluster_id),
            serde_json::to_string(record).unwrap(),
        ))
        .await
        .unwrap();
    }

    async fn stored_import(hub: &DeterministicClusterStore) -> Option<ImportRecord> {
        read_json::<DeterministicClusterStore, ImportRecord>(hub, &keys::import_record_key("work", "app"))
            .await
            .unwrap()
            .map(|o| o.value)
    }

    fn aggregator(
        hub: &Arc<DeterministicClusterStore>,
        sink: &Arc<RecordingTriggerSink>,
    ) -> ImportAggregator<DeterministicClusterStore> {
        ImportAggregator::new(hub.clone(), sink.clone())
    }

    #[tokio::test]
    async fn creates_import_from_contributors() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &resolved_record("east", 100, spec(80))).await;
        put_record(&hub, &resolved_record("west", 200, spec(80))).await;

        aggregator(&hub, &sink).reconcile("work", "app").await.unwrap();

        let import = stored_import(&hub).await.unwrap();
        assert_eq!(import.member_clusters, vec!["east", "west"]);
        assert_eq!(import.ports, spec(80).ports);

        let triggers = sink.drain();
        let kicked: Vec<&str> = triggers
            .iter()
            .filter_map(|t| match t {
                Trigger::PropagateEndpoints { source_cluster, .. } => Some(source_cluster.as_str()),
                _ => None,
            })
            .collect();
        assert!(kicked.contains(&"east"));
        assert!(kicked.contains(&"west"));
    }

    #[tokio::test]
    async fn unchanged_aggregate_is_a_no_op() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &resolved_record("east", 100, spec(80))).await;

        let a = aggregator(&hub, &sink);
        a.reconcile("work", "app").await.unwrap();
        sink.drain();

        let key = keys::import_record_key("work", "app");
        let rev = hub.mod_revision(&key).await.unwrap();
        a.reconcile("work", "app").await.unwrap();

        assert_eq!(hub.mod_revision(&key).await.unwrap(), rev);
        assert!(sink.drain().is_empty());
    }

    #[tokio::test]
    async fn conflicted_sibling_does_not_contribute() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &resolved_record("east", 100, spec(80))).await;
        let mut loser = resolved_record("west", 200, spec(9090));
        loser.conflict = Some(ConflictStatus::conflict("work", "app", "east", 1, 1000));
        put_record(&hub, &loser).await;

        aggregator(&hub, &sink).reconcile("work", "app").await.unwrap();

        let import = stored_import(&hub).await.unwrap();
        assert_eq!(import.member_clusters, vec!["east"]);
        assert_eq!(import.ports, spec(80).ports);
    }

    #[tokio::test]
    async fn last_contributor_withdrawal_deletes_import() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &resolved_record("east", 100, spec(80))).await;

        let a = aggregator(&hub, &sink);
        a.reconcile("work", "app").await.unwrap();
        assert!(stored_import(&hub).await.is_some());
        sink.drain();

        hub.delete(DeleteRequest::new(keys::export_record_key("work", "app", "east")))
            .await
            .unwrap();
        a.reconcile("work", "app").await.unwrap();

        assert!(stored_import(&hub).await.is_none());
        let triggers = sink.drain();
        assert!(triggers
            .iter()
            .any(|t| matches!(t, Trigger::PropagateEndpoints { source_cluster, .. } if source_cluster == "east")));
    }

    #[tokio::test]
    async fn membership_shrink_kicks_departed_cluster() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        put_record(&hub, &resolved_record("east", 100, spec(80))).await;
        put_record(&hub, &resolved_record("west", 200, spec(80))).await;

        let a = aggregator(&hub, &sink);
        a.reconcile("work", "app").await.unwrap();
        sink.drain();

        hub.delete(DeleteRequest::new(keys::export_record_key("work", "app", "west")))
            .await
            .unwrap();
        a.reconcile("work", "app").await.unwrap();

        let import = stored_import(&hub).await.unwrap();
        assert_eq!(import.member_clusters, vec!["east"]);

        let triggers = sink.drain();
        assert!(triggers
            .iter()
            .any(|t| matches!(t, Trigger::PropagateEndpoints { source_cluster, .. } if source_cluster == "west")));
    }

    #[tokio::test]
    async fn no_records_and_no_import_is_silent() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());

        aggregator(&hub, &sink).reconcile("work", "app").await.unwrap();
        assert!(sink.drain().is_empty());
    }

    #[tokio::test]
    async fn pending_sibling_does_not_contribute() {
        let hub = DeterministicClusterStore::new();
        let sink = Arc::new(RecordingTriggerSink::new());
        let mut pending = resolved_record("east", 100, spec(80));
        pending.conflict = Some(ConflictStatus::pending("work", "app", 1, 1000));
        put_record(&hub, &pending).await;

        aggregator(&hub, &sink).reconcile("work", "app").await.unwrap();
        assert!(stored_import(&hub).await.is_none());
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

        async fn delete(&self, request: DeleteRequest) -> Result<fleetmesh_store::DeleteResult, StoreError> {
            self.inner.delete(request).await
        }

        async fn scan(&self, request: ScanRequest) -> Result<fleetmesh_store::ScanResult, StoreError> {
            self.inner.scan(request).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cas_exhaustion_fails_and_requeues_the_aggregation() {
        let inner = DeterministicClusterStore::new();
        put_record(&inner, &resolved_record("east", 100, spec(80))).await;
        let hub: Arc<dyn ClusterStore> = Arc::new(ContendedStore { inner });
        let sink = Arc::new(RecordingTriggerSink::new());

        let a = ImportAggregator::new(hub, sink.clone());
        let err = a.reconcile("work", "app").await.unwrap_err();

        assert!(matches!(
            err,
            ControllerError::MaxRetriesExceeded { attempts, .. } if attempts == MAX_CAS_RETRIES
        ));
        let requeued = sink.drain_requeued();
        assert_eq!(requeued.len(), 1);
        assert!(matches!(&requeued[0].0, Trigger::AggregateImport { .. }));
        assert_eq!(requeued[0].1, Duration::from_millis(RESOLVE_RETRY_INTERVAL_MS));
    }
}
