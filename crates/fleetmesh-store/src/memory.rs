//! Deterministic in-memory store for tests.
//!
//! Thread-safe, supports every [`ClusterStore`] operation with predictable
//! behavior. Revision numbering matches the production contract: a global
//! revision counter advances on every write, and each key tracks its own
//! version plus create/mod revisions. Tests assert on `mod_revision` to
//! verify that no-op reconciliations really do not write.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::kv::DeleteRequest;
use crate::kv::DeleteResult;
use crate::kv::ReadRequest;
use crate::kv::ReadResult;
use crate::kv::ScanRequest;
use crate::kv::ScanResult;
use crate::kv::VersionedValue;
use crate::kv::WriteCommand;
use crate::kv::WriteRequest;
use crate::kv::WriteResult;
use crate::kv::validate_write_command;
use crate::traits::ClusterStore;

#[derive(Clone)]
struct Slot {
    value: String,
    version: u64,
    create_revision: u64,
    mod_revision: u64,
}

/// A deterministic in-memory cluster store.
pub struct DeterministicClusterStore {
    data: RwLock<BTreeMap<String, Slot>>,
    revision: RwLock<u64>,
}

impl Default for DeterministicClusterStore {
    fn default() -> Self {
        Self::new_inner()
    }
}

impl DeterministicClusterStore {
    /// Create a new store wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::new_inner())
    }

    fn new_inner() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            revision: RwLock::new(0),
        }
    }

    async fn next_revision(&self) -> u64 {
        let mut rev = self.revision.write().await;
        *rev += 1;
        *rev
    }

    /// Current mod revision of a key, or None if absent. Test helper.
    pub async fn mod_revision(&self, key: &str) -> Option<u64> {
        self.data.read().await.get(key).map(|s| s.mod_revision)
    }
}

fn to_versioned(key: &str, slot: &Slot) -> VersionedValue {
    VersionedValue {
        key: key.to_string(),
        value: slot.value.clone(),
        version: slot.version,
        create_revision: slot.create_revision,
        mod_revision: slot.mod_revision,
    }
}

#[async_trait]
impl ClusterStore for DeterministicClusterStore {
    async fn read(&self, request: ReadRequest) -> Result<ReadResult, StoreError> {
        let data = self.data.read().await;
        Ok(ReadResult {
            kv: data.get(&request.key).map(|slot| to_versioned(&request.key, slot)),
        })
    }

    async fn write(&self, request: WriteRequest) -> Result<WriteResult, StoreError> {
        validate_write_command(&request.command)?;
        let revision = self.next_revision().await;
        let mut data = self.data.write().await;

        match &request.command {
            WriteCommand::Put { key, value } => {
                match data.get_mut(key) {
                    Some(slot) => {
                        slot.value = value.clone();
                        slot.version += 1;
                        slot.mod_revision = revision;
                    }
                    None => {
                        data.insert(key.clone(), Slot {
                            value: value.clone(),
                            version: 1,
                            create_revision: revision,
                            mod_revision: revision,
                        });
                    }
                }
            }
            WriteCommand::CompareAndSwap {
                key,
                expected,
                new_value,
            } => {
                let current = data.get(key).map(|s| s.value.clone());
                if current.as_ref() != expected.as_ref() {
                    return Err(StoreError::CompareAndSwapFailed {
                        key: key.clone(),
                        expected: expected.clone(),
                        actual: current,
                    });
                }
                match data.get_mut(key) {
                    Some(slot) => {
                        slot.value = new_value.clone();
                        slot.version += 1;
                        slot.mod_revision = revision;
                    }
                    None => {
                        data.insert(key.clone(), Slot {
                            value: new_value.clone(),
                            version: 1,
                            create_revision: revision,
                            mod_revision: revision,
                        });
                    }
                }
            }
            WriteCommand::Delete { key } => {
                data.remove(key);
            }
        }

        Ok(WriteResult { revision })
    }

    async fn delete(&self, request: DeleteRequest) -> Result<DeleteResult, StoreError> {
        let _revision = self.next_revision().await;
        let mut data = self.data.write().await;
        let is_deleted = data.remove(&request.key).is_some();
        Ok(DeleteResult {
            key: request.key,
            is_deleted,
        })
    }

    async fn scan(&self, request: ScanRequest) -> Result<ScanResult, StoreError> {
        use crate::constants::DEFAULT_SCAN_LIMIT;

        let data = self.data.read().await;
        let limit = request.limit.unwrap_or(DEFAULT_SCAN_LIMIT) as usize;

        let entries: Vec<VersionedValue> = data
            .iter()
            .filter(|(k, _)| k.starts_with(&request.prefix))
            .take(limit + 1)
            .map(|(k, slot)| to_versioned(k, slot))
            .collect();

        let is_truncated = entries.len() > limit;
        let entries = if is_truncated { entries[..limit].to_vec() } else { entries };

        Ok(ScanResult {
            count: entries.len() as u32,
            entries,
            is_truncated,
        })
    }
}
