//! Member-side export intent reconciler.
//!
//! Mirrors a member cluster's export intents into per-member hub records.
//! Withdrawal of the intent deletes the hub record and kicks the downstream
//! reconcilers so the sibling set is re-resolved without the departed
//! member.

use std::sync::Arc;
use std::time::Duration;

use fleetmesh_store::CAS_RETRY_INITIAL_BACKOFF_MS;
use fleetmesh_store::CAS_RETRY_MAX_BACKOFF_MS;
use fleetmesh_store::ClusterStore;
use fleetmesh_store::DeleteRequest;
use fleetmesh_store::MAX_CAS_RETRIES;
use fleetmesh_store::StoreError;
use fleetmesh_types::ConflictStatus;
use fleetmesh_types::ExportIntent;
use fleetmesh_types::ExportRecord;
use fleetmesh_types::keys;
use fleetmesh_types::now_unix_ms;
use tracing::debug;
use tracing::warn;

use crate::error::ControllerError;
use crate::objects::cas_raw;
use crate::objects::read_json;
use crate::objects::to_raw;
use crate::trigger::Trigger;
use crate::trigger::TriggerSink;

/// Reconciles one member cluster's export intents into hub export records.
pub struct ExportIntentReconciler<S: ClusterStore + ?Sized> {
    member: Arc<S>,
    hub: Arc<S>,
    cluster_id: String,
    sink: Arc<dyn TriggerSink>,
}

impl<S: ClusterStore + ?Sized + 'static> ExportIntentReconciler<S> {
    pub fn new(member: Arc<S>, hub: Arc<S>, cluster_id: impl Into<String>, sink: Arc<dyn TriggerSink>) -> Self {
        Self {
            member,
            hub,
            cluster_id: cluster_id.into(),
            sink,
        }
    }

    /// Reconcile the intent identified by `{namespace}/{service}`.
    ///
    /// Level-triggered: re-reads the member intent and the hub record, then
    /// converges the hub record through CAS. Invoking this any number of
    /// times with unchanged inputs performs no writes after the first.
    pub async fn reconcile(&self, namespace: &str, service: &str) -> Result<(), ControllerError> {
        let intent_key = keys::export_intent_key(namespace, service);
        let record_key = keys::export_record_key(namespace, service, &self.cluster_id);

        let intent = match read_json::<S, ExportIntent>(&self.member, &intent_key).await? {
            Some(obj) => obj.value,
            None => return self.withdraw(namespace, service, &record_key).await,
        };

        if let Err(violation) = intent.validate_names() {
            // Bad names cannot be keyed into the fleet; retrying cannot fix
            // them, only a corrected intent can.
            warn!(namespace, service, %violation, "export intent has invalid names, skipping");
            return Ok(());
        }

        let mut attempt = 0u32;
        let mut backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;

        loop {
            let existing = read_json::<S, ExportRecord>(&self.hub, &record_key).await?;
            let now = now_unix_ms();

            let (desired, expected, spec_changed, endpoints_changed) = match &existing {
                None => {
                    let record = ExportRecord {
                        cluster_id: self.cluster_id.clone(),
                        namespace: namespace.to_string(),
                        service_name: service.to_string(),
                        generation: intent.generation,
                        created_at_ms: now,
                        spec: intent.spec.clone(),
                        endpoints: intent.endpoints.clone(),
                        conflict: Some(ConflictStatus::pending(namespace, service, intent.generation, now)),
                    };
                    (record, None, true, true)
                }
                Some(obj) => {
                    let record = &obj.value;
                    let spec_changed = record.generation != intent.generation || record.spec != intent.spec;
                    let endpoints_changed = record.endpoints != intent.endpoints;
                    if !spec_changed && !endpoints_changed {
                        return Ok(());
                    }

                    let mut updated = record.clone();
                    updated.generation = intent.generation;
                    updated.spec = intent.spec.clone();
                    updated.endpoints = intent.endpoints.clone();
                    if spec_changed {
                        // A new generation is unresolved until the resolver
                        // observes it.
                        updated.conflict = Some(ConflictStatus::pending(namespace, service, intent.generation, now));
                    }
                    (updated, Some(obj.raw.clone()), spec_changed, endpoints_changed)
                }
            };

            let raw = to_raw(&desired)?;
            match cas_raw(&self.hub, &record_key, expected, raw).await {
                Ok(()) => {
                    debug!(
                        cluster = %self.cluster_id,
                        namespace,
                        service,
                        generation = intent.generation,
                        spec_changed,
                        endpoints_changed,
                        "export record synced to hub"
                    );
                    if spec_changed {
                        self.sink.enqueue(Trigger::ResolveConflicts {
                            namespace: namespace.to_string(),
                            service: service.to_string(),
                        });
                        self.sink.enqueue(Trigger::AggregateImport {
                            namespace: namespace.to_string(),
                            service: service.to_string(),
                        });
                        self.sink.enqueue(Trigger::ReportStatus {
                            cluster_id: self.cluster_id.clone(),
                            namespace: namespace.to_string(),
                            service: service.to_string(),
                        });
                    }
                    if endpoints_changed {
                        self.sink.enqueue(Trigger::PropagateEndpoints {
                            namespace: namespace.to_string(),
                            service: service.to_string(),
                            source_cluster: self.cluster_id.clone(),
                        });
                    }
                    return Ok(());
                }
                Err(StoreError::CompareAndSwapFailed { .. }) => {
                    attempt += 1;
                    if attempt >= MAX_CAS_RETRIES {
                        self.sink.requeue(
                            Trigger::SyncExport {
                                cluster_id: self.cluster_id.clone(),
                                namespace: namespace.to_string(),
                                service: service.to_string(),
                            },
                            Duration::from_millis(crate::constants::RESOLVE_RETRY_INTERVAL_MS),
                        );
                        return Err(ControllerError::MaxRetriesExceeded {
                            operation: format!("sync export {namespace}/{service}"),
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

    /// Intent is gone: remove the hub record and re-resolve the siblings.
    async fn withdraw(&self, namespace: &str, service: &str, record_key: &str) -> Result<(), ControllerError> {
        let result = self.hub.delete(DeleteRequest::new(record_key)).await?;
        if result.is_deleted {
            debug!(cluster = %self.cluster_id, namespace, service, "export withdrawn, hub record removed");
            self.sink.enqueue(Trigger::ResolveConflicts {
                namespace: namespace.to_string(),
                service: service.to_string(),
            });
            self.sink.enqueue(Trigger::AggregateImport {
                namespace: namespace.to_string(),
                service: service.to_string(),
            });
            self.sink.enqueue(Trigger::PropagateEndpoints {
                namespace: namespace.to_string(),
                service: service.to_string(),
                source_cluster: self.cluster_id.clone(),
            });
        }
        Ok(())
    }
}
