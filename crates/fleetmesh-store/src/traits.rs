//! The store interface consumed by every reconciler.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::kv::DeleteRequest;
use crate::kv::DeleteResult;
use crate::kv::ReadRequest;
use crate::kv::ReadResult;
use crate::kv::ScanRequest;
use crate::kv::ScanResult;
use crate::kv::WriteRequest;
use crate::kv::WriteResult;

/// Object store of a single cluster's control plane.
///
/// Implementations must provide linearizable reads and atomic
/// compare-and-swap writes; that is the only concurrency primitive the
/// controllers rely on. Scans return entries in lexicographic key order.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Read a value by key with revision metadata.
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StoreError>;

    /// Apply a write command.
    async fn write(&self, request: WriteRequest) -> Result<WriteResult, StoreError>;

    /// Delete a key.
    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, StoreError>;

    /// Scan keys matching a prefix.
    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, StoreError>;
}

// Blanket implementation for Arc<T>
#[async_trait]
impl<T: ClusterStore + ?Sized> ClusterStore for std::sync::Arc<T> {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StoreError> {
        (**self).read(request).await
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteResult, StoreError> {
        (**self).write(request).await
    }

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, StoreError> {
        (**self).delete(request).await
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, StoreError> {
        (**self).scan(request).await
    }
}
