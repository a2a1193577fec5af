//! Error types for the reconcilers.

use fleetmesh_store::StoreError;
use snafu::Snafu;

/// Errors surfaced by a reconciliation run.
///
/// No error crosses a component boundary: callers (the external work queue)
/// only log these and re-deliver the key. Cross-component effects are
/// observable state changes and trigger signals exclusively.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ControllerError {
    /// Underlying store error.
    #[snafu(display("store error: {source}"))]
    Store {
        /// The underlying error.
        source: StoreError,
    },

    /// JSON serialization/deserialization error.
    #[snafu(display("serialization error: {source}"))]
    Serialization {
        /// The underlying error.
        source: serde_json::Error,
    },

    /// Data in the store is unparseable for its expected type.
    #[snafu(display("corrupted object at key '{key}': {reason}"))]
    CorruptedObject {
        /// The key holding the corrupted document.
        key: String,
        /// Description of what went wrong.
        reason: String,
    },

    /// CAS retry budget exhausted; the key has been re-queued.
    #[snafu(display("max retries exceeded for {operation}: {attempts} attempts"))]
    MaxRetriesExceeded {
        /// Description of the operation.
        operation: String,
        /// Number of attempts made.
        attempts: u32,
    },
}

impl From<StoreError> for ControllerError {
    fn from(source: StoreError) -> Self {
        ControllerError::Store { source }
    }
}

impl From<serde_json::Error> for ControllerError {
    fn from(source: serde_json::Error) -> Self {
        ControllerError::Serialization { source }
    }
}
