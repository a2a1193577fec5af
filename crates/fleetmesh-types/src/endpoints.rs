//! Replicated reachability data for a resolved export.

use serde::Deserialize;
use serde::Serialize;

/// Per-(service, contributing cluster) replica of endpoint addresses.
///
/// Written into every importing member cluster; valid only while the source
/// cluster's export record is NoConflict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSnapshot {
    pub service_name: String,
    pub namespace: String,
    /// Cluster whose service backs these addresses.
    pub source_cluster: String,
    pub addresses: Vec<String>,
}
