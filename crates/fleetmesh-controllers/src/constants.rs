//! Fixed intervals and bounds for the reconcilers.

/// Coarse re-queue interval after a conflict-resolution run exhausts its CAS
/// retry budget. Resolution is never abandoned, only deferred.
pub const RESOLVE_RETRY_INTERVAL_MS: u64 = 30_000;

/// Re-queue interval after endpoint fan-out fails for one or more
/// destinations. Successful destinations no-op on the retry pass.
pub const ENDPOINT_RETRY_INTERVAL_MS: u64 = 10_000;

/// Upper bound on sibling export records scanned for one service name,
/// i.e. on member clusters exporting the same name.
pub const MAX_SIBLING_RECORDS: u32 = 512;
