//! Endpoint fan-out from the hub to importing member clusters.
//!
//! Each (service, source cluster) pair produces one endpoint snapshot per
//! importing member. Destinations are written independently: one slow or
//! unreachable member never blocks delivery to the rest, it only earns the
//! trigger a coarse re-queue.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fleetmesh_store::ClusterStore;
use fleetmesh_store::DeleteRequest;
use fleetmesh_store::WriteRequest;
use fleetmesh_types::EndpointSnapshot;
use fleetmesh_types::ExportRecord;
use fleetmesh_types::ImportRecord;
use fleetmesh_types::keys;
use futures::future::join_all;
use tracing::debug;
use tracing::warn;

use crate::constants::ENDPOINT_RETRY_INTERVAL_MS;
use crate::error::ControllerError;
use crate::objects::read_json;
use crate::objects::to_raw;
use crate::trigger::Trigger;
use crate::trigger::TriggerSink;

/// Propagates one source cluster's endpoints to all importing members.
pub struct EndpointPropagator<S: ClusterStore + ?Sized> {
    hub: Arc<S>,
    members: BTreeMap<String, Arc<S>>,
    sink: Arc<dyn TriggerSink>,
}

impl<S: ClusterStore + ?Sized + 'static> EndpointPropagator<S> {
    pub fn new(hub: Arc<S>, members: BTreeMap<String, Arc<S>>, sink: Arc<dyn TriggerSink>) -> Self {
        Self { hub, members, sink }
    }

    /// Converge the snapshot for `{namespace}/{service}` from `source_cluster`
    /// on every member store.
    ///
    /// Members in the import record's membership receive the snapshot; all
    /// others have it withdrawn. A source whose export record is gone or not
    /// resolved NoConflict has its snapshot withdrawn everywhere. Failed
    /// destinations are logged and the trigger re-queued; the call still
    /// returns `Ok` so successful destinations are not re-driven by an error
    /// path.
    pub async fn reconcile(&self, namespace: &str, service: &str, source_cluster: &str) -> Result<(), ControllerError> {
        let record_key = keys::export_record_key(namespace, service, source_cluster);
        let record = read_json::<S, ExportRecord>(&self.hub, &record_key)
            .await?
            .map(|obj| obj.value);
        let active = record.as_ref().is_some_and(|r| r.is_resolved_no_conflict());

        let import_key = keys::import_record_key(namespace, service);
        let membership: BTreeSet<String> = if active {
            read_json::<S, ImportRecord>(&self.hub, &import_key)
                .await?
                .map(|obj| obj.value.member_clusters.into_iter().collect())
                .unwrap_or_default()
        } else {
            BTreeSet::new()
        };

        let desired = match (&record, active) {
            (Some(record), true) => Some(EndpointSnapshot {
                service_name: service.to_string(),
                namespace: namespace.to_string(),
                source_cluster: source_cluster.to_string(),
                addresses: record.endpoints.clone(),
            }),
            _ => None,
        };

        let snapshot_key = keys::endpoint_snapshot_key(namespace, service, source_cluster);

        let deliveries = self.members.iter().map(|(cluster_id, store)| {
            let wanted = desired.as_ref().filter(|_| membership.contains(cluster_id));
            let key = snapshot_key.as_str();
            async move {
                let outcome = sync_destination(store.as_ref(), key, wanted).await;
                (cluster_id.as_str(), outcome)
            }
        });

        let mut failed = 0u32;
        for (cluster_id, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(true) => debug!(namespace, service, source_cluster, destination = cluster_id, "snapshot synced"),
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    warn!(
                        namespace,
                        service,
                        source_cluster,
                        destination = cluster_id,
                        error = %e,
                        "endpoint delivery failed"
                    );
                }
            }
        }

        if failed > 0 {
            self.sink.requeue(
                Trigger::PropagateEndpoints {
                    namespace: namespace.to_string(),
                    service: service.to_string(),
                    source_cluster: source_cluster.to_string(),
                },
                Duration::from_millis(ENDPOINT_RETRY_INTERVAL_MS),
            );
        }
        Ok(())
    }
}

/// Place or withdraw one snapshot on one member store. Returns whether a
/// write happened.
async fn sync_destination<S: ClusterStore + ?Sized>(
    store: &S,
    key: &str,
    desired: Option<&EndpointSnapshot>,
) -> Result<bool, ControllerError> {
    match desired {
        Some(snapshot) => {
            // The propagator is the sole writer of snapshot keys, so a plain
            // put is safe; the read is only there to skip no-op writes.
            if let Some(existing) = read_json::<S, EndpointSnapshot>(store, key).await.ok().flatten() {
                if existing.value == *snapshot {
                    return Ok(false);
                }
            }
            let raw = to_raw(snapshot)?;
            store.write(WriteRequest::put(key, raw)).await?;
            Ok(true)
        }
        None => {
            let result = store.delete(DeleteRequest::new(key)).await?;
            Ok(result.is_deleted)
        }
    }
}
