//! Centralized bounds for store operations.
//!
//! Constants are fixed and immutable, enforced at compile time. Each bound
//! exists to prevent unbounded resource allocation in the store layer.

/// Maximum key size in bytes.
pub const MAX_KEY_SIZE: u32 = 1024;

/// Maximum value size in bytes (objects are JSON documents).
pub const MAX_VALUE_SIZE: u32 = 1024 * 1024;

/// Maximum entries a single scan may return.
pub const MAX_SCAN_RESULTS: u32 = 1024;

/// Default scan limit when the caller does not specify one.
pub const DEFAULT_SCAN_LIMIT: u32 = 256;

/// Maximum compare-and-swap attempts before a reconciliation run is
/// reported as failed and re-queued at a coarse interval.
pub const MAX_CAS_RETRIES: u32 = 10;

/// Initial backoff between CAS retries in milliseconds.
pub const CAS_RETRY_INITIAL_BACKOFF_MS: u64 = 10;

/// Backoff ceiling between CAS retries in milliseconds.
pub const CAS_RETRY_MAX_BACKOFF_MS: u64 = 500;
