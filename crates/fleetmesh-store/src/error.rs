//! Error types for store operations.

use snafu::Snafu;

/// Errors from a cluster object store.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// Requested key was not found.
    #[snafu(display("key '{key}' not found"))]
    NotFound {
        /// Key the caller attempted to read.
        key: String,
    },

    /// Compare-and-swap failed because the stored value no longer matches.
    ///
    /// This is the normal signal for optimistic-concurrency conflicts; callers
    /// re-read current state and retry.
    #[snafu(display("compare-and-swap failed for key '{key}'"))]
    CompareAndSwapFailed {
        /// Key the caller attempted to swap.
        key: String,
        /// Value the caller expected to find (None = key absent).
        expected: Option<String>,
        /// Value actually stored (None = key absent).
        actual: Option<String>,
    },

    /// Empty keys are rejected.
    #[snafu(display("empty key"))]
    EmptyKey,

    /// Key exceeds the fixed size bound.
    #[snafu(display("key size {size} exceeds maximum of {max} bytes"))]
    KeyTooLarge { size: u32, max: u32 },

    /// Value exceeds the fixed size bound.
    #[snafu(display("value size {size} exceeds maximum of {max} bytes"))]
    ValueTooLarge { size: u32, max: u32 },

    /// Backend failed (network, storage, apiserver unavailable).
    #[snafu(display("store unavailable: {reason}"))]
    Unavailable {
        /// Description of the backend failure.
        reason: String,
    },
}

impl StoreError {
    /// Whether a retry against fresh state may succeed.
    ///
    /// CAS conflicts and backend failures are transient; size violations and
    /// empty keys are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::CompareAndSwapFailed { .. } | StoreError::Unavailable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = StoreError::NotFound { key: "my-key".into() };
        assert_eq!(err.to_string(), "key 'my-key' not found");
    }

    #[test]
    fn cas_conflict_is_retryable() {
        let err = StoreError::CompareAndSwapFailed {
            key: "k".into(),
            expected: None,
            actual: Some("v".into()),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn size_violations_are_terminal() {
        assert!(!StoreError::EmptyKey.is_retryable());
        assert!(!StoreError::KeyTooLarge { size: 2048, max: 1024 }.is_retryable());
    }
}
