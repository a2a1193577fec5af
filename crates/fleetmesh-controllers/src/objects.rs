//! Internal helpers for reading and CAS-writing JSON objects.

use fleetmesh_store::ClusterStore;
use fleetmesh_store::ReadRequest;
use fleetmesh_store::StoreError;
use fleetmesh_store::WriteRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ControllerError;

/// A parsed object together with the raw document it was parsed from.
///
/// The raw form is what compare-and-swap expects; re-serializing the parsed
/// value is not guaranteed to be byte-identical.
pub(crate) struct StoredObject<T> {
    pub value: T,
    pub raw: String,
}

/// Read and parse a JSON object. Absent keys are `None`; unparseable
/// documents are surfaced as [`ControllerError::CorruptedObject`].
pub(crate) async fn read_json<S, T>(store: &S, key: &str) -> Result<Option<StoredObject<T>>, ControllerError>
where
    S: ClusterStore + ?Sized,
    T: DeserializeOwned,
{
    let result = match store.read(ReadRequest::new(key)).await {
        Ok(result) => result,
        Err(StoreError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match result.kv {
        None => Ok(None),
        Some(kv) => {
            let value = serde_json::from_str(&kv.value).map_err(|e| ControllerError::CorruptedObject {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Some(StoredObject { value, raw: kv.value }))
        }
    }
}

/// Serialize a value for storage.
pub(crate) fn to_raw<T: Serialize>(value: &T) -> Result<String, ControllerError> {
    Ok(serde_json::to_string(value)?)
}

/// Compare-and-swap a raw document against the one previously read.
///
/// `expected: None` creates the key and fails if it already exists. Returns
/// the store's CAS failure unchanged so callers can retry against fresh
/// state.
pub(crate) async fn cas_raw<S>(store: &S, key: &str, expected: Option<String>, new_raw: String) -> Result<(), StoreError>
where
    S: ClusterStore + ?Sized,
{
    store
        .write(WriteRequest::compare_and_swap(key, expected, new_raw))
        .await?;
    Ok(())
}
