//! Versioned object-store abstraction for fleetmesh controllers.
//!
//! Every cluster in the fleet (the hub and each member) exposes its control
//! plane state through this interface: read a single object, scan a key
//! prefix, and mutate with compare-and-swap semantics. The reconcilers in
//! `fleetmesh-controllers` never share memory; all coordination happens
//! through CAS writes against stores implementing [`ClusterStore`].
//!
//! The production implementation is provided by the hosting process (an
//! informer-backed API client); [`memory::DeterministicClusterStore`] is the
//! in-memory implementation used throughout the test suites.

pub mod constants;
pub mod error;
pub mod kv;
pub mod memory;
pub mod traits;

pub use constants::CAS_RETRY_INITIAL_BACKOFF_MS;
pub use constants::CAS_RETRY_MAX_BACKOFF_MS;
pub use constants::DEFAULT_SCAN_LIMIT;
pub use constants::MAX_CAS_RETRIES;
pub use constants::MAX_KEY_SIZE;
pub use constants::MAX_SCAN_RESULTS;
pub use constants::MAX_VALUE_SIZE;
pub use error::StoreError;
pub use kv::DeleteRequest;
pub use kv::DeleteResult;
pub use kv::ReadRequest;
pub use kv::ReadResult;
pub use kv::ScanRequest;
pub use kv::ScanResult;
pub use kv::VersionedValue;
pub use kv::WriteCommand;
pub use kv::WriteRequest;
pub use kv::WriteResult;
pub use kv::validate_write_command;
pub use memory::DeterministicClusterStore;
pub use traits::ClusterStore;
