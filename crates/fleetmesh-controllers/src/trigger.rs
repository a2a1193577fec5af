//! Re-enqueue signalling between reconcilers.
//!
//! The external watch/queue runtime owns scheduling; reconcilers emit
//! [`Trigger`] values into a [`TriggerSink`] and the runtime folds them into
//! its key-deduplicated work queues. This is the only channel between
//! components besides the stores themselves.

use std::sync::Mutex;
use std::time::Duration;

/// A reconciliation key to (re-)deliver.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Trigger {
    /// Re-run the export intent reconciler for a member intent.
    SyncExport {
        cluster_id: String,
        namespace: String,
        service: String,
    },
    /// Re-run conflict resolution over the sibling set of a service name.
    ResolveConflicts { namespace: String, service: String },
    /// Re-run status report-back for one member's export.
    ReportStatus {
        cluster_id: String,
        namespace: String,
        service: String,
    },
    /// Re-run import aggregation for a service name.
    AggregateImport { namespace: String, service: String },
    /// Re-run endpoint fan-out for one contributing cluster.
    PropagateEndpoints {
        namespace: String,
        service: String,
        source_cluster: String,
    },
}

/// Sink for reconciliation triggers.
///
/// `enqueue` delivers as soon as a worker is free; `requeue` defers delivery,
/// used when waiting for upstream state or after a retry budget is exhausted.
/// Both are fire-and-forget: the queue deduplicates per key.
pub trait TriggerSink: Send + Sync {
    /// Deliver a trigger immediately.
    fn enqueue(&self, trigger: Trigger);

    /// Deliver a trigger after a delay.
    fn requeue(&self, trigger: Trigger, after: Duration);
}

/// Trigger sink that records everything, for tests and for driving
/// reconcilers to a fixed point without a live queue runtime.
#[derive(Default)]
pub struct RecordingTriggerSink {
    enqueued: Mutex<Vec<Trigger>>,
    requeued: Mutex<Vec<(Trigger, Duration)>>,
}

impl RecordingTriggerSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all immediately-enqueued triggers recorded so far.
    pub fn drain(&self) -> Vec<Trigger> {
        let mut guard = self.enqueued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }

    /// Take all deferred triggers recorded so far.
    pub fn drain_requeued(&self) -> Vec<(Trigger, Duration)> {
        let mut guard = self.requeued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *guard)
    }
}

impl TriggerSink for RecordingTriggerSink {
    fn enqueue(&self, trigger: Trigger) {
        let mut guard = self.enqueued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push(trigger);
    }

    fn requeue(&self, trigger: Trigger, after: Duration) {
        let mut guard = self.requeued.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.push((trigger, after));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_drains_in_order() {
        let sink = RecordingTriggerSink::new();
        sink.enqueue(Trigger::ResolveConflicts {
            namespace: "work".into(),
            service: "app".into(),
        });
        sink.enqueue(Trigger::AggregateImport {
            namespace: "work".into(),
            service: "app".into(),
        });

        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert!(matches!(drained[0], Trigger::ResolveConflicts { .. }));
        assert!(sink.drain().is_empty());
    }

    #[test]
    fn requeues_tracked_separately() {
        let sink = RecordingTriggerSink::new();
        sink.requeue(
            Trigger::ResolveConflicts {
                namespace: "work".into(),
                service: "app".into(),
            },
            Duration::from_secs(30),
        );
        assert!(sink.drain().is_empty());
        let requeued = sink.drain_requeued();
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].1, Duration::from_secs(30));
    }
}
