//! Member-side status propagator.
//!
//! Reads the conflict verdict off a member's hub export record and reports
//! it back as a `Conflict` condition on the member's export intent. The
//! wire shape of the condition is fixed; see [`fleetmesh_types::Condition`].

use std::sync::Arc;
use std::time::Duration;

use fleetmesh_store::CAS_RETRY_INITIAL_BACKOFF_MS;
use fleetmesh_store::CAS_RETRY_MAX_BACKOFF_MS;
use fleetmesh_store::ClusterStore;
use fleetmesh_store::MAX_CAS_RETRIES;
use fleetmesh_store::StoreError;
use fleetmesh_types::CONDITION_TYPE_CONFLICT;
use fleetmesh_types::Condition;
use fleetmesh_types::ConditionStatus;
use fleetmesh_types::ConflictStatus;
use fleetmesh_types::ConflictVerdict;
use fleetmesh_types::ExportIntent;
use fleetmesh_types::ExportRecord;
use fleetmesh_types::keys;
use fleetmesh_types::now_unix_ms;
use tracing::debug;

use crate::error::ControllerError;
use crate::objects::cas_raw;
use crate::objects::read_json;
use crate::objects::to_raw;

/// Reports hub conflict verdicts back onto one member's export intents.
pub struct StatusPropagator<S: ClusterStore + ?Sized> {
    member: Arc<S>,
    hub: Arc<S>,
    cluster_id: String,
}

/// Translate a hub verdict into the member-facing condition.
fn condition_from_status(status: &ConflictStatus, intent_generation: u64, now_ms: u64) -> Condition {
    let condition_status = match status.verdict {
        ConflictVerdict::Unknown => ConditionStatus::Unknown,
        ConflictVerdict::NoConflict => ConditionStatus::False,
        ConflictVerdict::Conflict => ConditionStatus::True,
    };
    Condition {
        condition_type: CONDITION_TYPE_CONFLICT.to_string(),
        status: condition_status,
        reason: status.reason.clone(),
        message: status.message.clone(),
        observed_generation: intent_generation,
        last_transition_time: now_ms,
    }
}

impl<S: ClusterStore + ?Sized + 'static> StatusPropagator<S> {
    pub fn new(member: Arc<S>, hub: Arc<S>, cluster_id: impl Into<String>) -> Self {
        Self {
            member,
            hub,
            cluster_id: cluster_id.into(),
        }
    }

    /// Report the hub verdict for `{namespace}/{service}` onto the member
    /// intent.
    ///
    /// No-ops when the hub record carries no verdict yet, when the member
    /// intent is gone, or when the stored condition already matches the
    /// verdict in type, status, and reason.
    pub async fn reconcile(&self, namespace: &str, service: &str) -> Result<(), ControllerError> {
        let record_key = keys::export_record_key(namespace, service, &self.cluster_id);
        let record = match read_json::<S, ExportRecord>(&self.hub, &record_key).await? {
            Some(obj) => obj.value,
            None => return Ok(()),
        };
        let verdict = match &record.conflict {
            Some(status) => status.clone(),
            None => return Ok(()),
        };

        let intent_key = keys::export_intent_key(namespace, service);

        let mut attempt = 0u32;
        let mut backoff_ms = CAS_RETRY_INITIAL_BACKOFF_MS;

        loop {
            let obj = match read_json::<S, ExportIntent>(&self.member, &intent_key).await? {
                Some(obj) => obj,
                None => {
                    // Unexported while the verdict was in flight; the
                    // withdrawal path cleans the hub up.
                    debug!(cluster = %self.cluster_id, namespace, service, "intent gone, nothing to report");
                    return Ok(());
                }
            };
            let intent = &obj.value;

            let desired = condition_from_status(&verdict, intent.generation, now_unix_ms());
            if let Some(existing) = intent.status.condition(CONDITION_TYPE_CONFLICT) {
                if existing.semantically_equal(&desired) {
                    return Ok(());
                }
            }

            let mut updated = intent.clone();
            updated.status.set_condition(desired);
            let raw = to_raw(&updated)?;

            match cas_raw(&self.member, &intent_key, Some(obj.raw), raw).await {
                Ok(()) => {
                    debug!(
                        cluster = %self.cluster_id,
                        namespace,
                        service,
                        verdict = ?verdict.verdict,
                        reason = %verdict.reason,
                        "conflict condition reported"
                    );
                    return Ok(());
                }
                Err(StoreError::CompareAndSwapFailed { .. }) => {
                    attempt += 1;
                    if attempt >= MAX_CAS_RETRIES {
                        return Err(ControllerError::MaxRetriesExceeded {
                            operation: format!("report status {namespace}/{service}"),
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
