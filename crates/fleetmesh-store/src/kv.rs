//! Request and response types for store operations.
//!
//! Objects are stored as JSON strings under canonical keys. Every stored
//! value carries revision metadata so callers can implement optimistic
//! concurrency: read the current value, compute the desired state, then
//! compare-and-swap against what was read.

use serde::Deserialize;
use serde::Serialize;

use crate::constants::MAX_KEY_SIZE;
use crate::constants::MAX_VALUE_SIZE;
use crate::error::StoreError;

/// Commands for mutating store state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum WriteCommand {
    /// Unconditionally set a key.
    Put { key: String, value: String },
    /// Atomically update a key if the current value matches `expected`.
    ///
    /// `expected: None` means "key must not exist", which makes creation
    /// race-free.
    CompareAndSwap {
        key: String,
        expected: Option<String>,
        new_value: String,
    },
    /// Delete a key. Deleting an absent key is not an error.
    Delete { key: String },
}

/// A stored value with revision metadata for optimistic concurrency control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionedValue {
    /// The key identifying this object.
    pub key: String,
    /// The stored JSON document.
    pub value: String,
    /// Key-specific version, incremented on each modification. Starts at 1.
    pub version: u64,
    /// Store revision when the key was first created. Never changes; used for
    /// determining the relative age of objects.
    pub create_revision: u64,
    /// Store revision of the most recent modification to this key.
    pub mod_revision: u64,
}

/// Request to perform a write operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteRequest {
    pub command: WriteCommand,
}

impl WriteRequest {
    /// Create a Put command.
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            command: WriteCommand::Put {
                key: key.into(),
                value: value.into(),
            },
        }
    }

    /// Create a CompareAndSwap command.
    pub fn compare_and_swap(key: impl Into<String>, expected: Option<String>, new_value: impl Into<String>) -> Self {
        Self {
            command: WriteCommand::CompareAndSwap {
                key: key.into(),
                expected,
                new_value: new_value.into(),
            },
        }
    }

    /// Create a Delete command.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            command: WriteCommand::Delete { key: key.into() },
        }
    }
}

/// Result of a write operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteResult {
    /// Store revision assigned to the write.
    pub revision: u64,
}

/// Request to read a single key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadRequest {
    pub key: String,
}

impl ReadRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Response from a read operation. `kv: None` means the key is absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadResult {
    pub kv: Option<VersionedValue>,
}

/// Request to delete a key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteRequest {
    pub key: String,
}

impl DeleteRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Result of a delete operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub key: String,
    /// Whether the key existed before the delete.
    pub is_deleted: bool,
}

/// Request to scan keys with a given prefix, in lexicographic key order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanRequest {
    pub prefix: String,
    pub limit: Option<u32>,
}

impl ScanRequest {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Response from a scan operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanResult {
    pub entries: Vec<VersionedValue>,
    pub count: u32,
    pub is_truncated: bool,
}

/// Validate a write command against fixed size limits.
pub fn validate_write_command(command: &WriteCommand) -> Result<(), StoreError> {
    let check_key = |key: &str| {
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        let len = key.len();
        if len > MAX_KEY_SIZE as usize {
            Err(StoreError::KeyTooLarge {
                size: len as u32,
                max: MAX_KEY_SIZE,
            })
        } else {
            Ok(())
        }
    };

    let check_value = |value: &str| {
        let len = value.len();
        if len > MAX_VALUE_SIZE as usize {
            Err(StoreError::ValueTooLarge {
                size: len as u32,
                max: MAX_VALUE_SIZE,
            })
        } else {
            Ok(())
        }
    };

    match command {
        WriteCommand::Put { key, value } => {
            check_key(key)?;
            check_value(value)?;
        }
        WriteCommand::CompareAndSwap {
            key,
            expected,
            new_value,
        } => {
            check_key(key)?;
            if let Some(exp) = expected {
                check_value(exp)?;
            }
            check_value(new_value)?;
        }
        WriteCommand::Delete { key } => {
            check_key(key)?;
        }
    }

    Ok(())
}
