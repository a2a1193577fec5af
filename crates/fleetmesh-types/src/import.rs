//! The hub's resolved, fleet-wide definition of an importable service.

use serde::Deserialize;
use serde::Serialize;

use crate::export::ServicePort;
use crate::export::ServiceType;

/// Aggregate of all NoConflict exports for one service name.
///
/// Wire shape is stable for downstream DNS/proxy consumers: `serviceName`,
/// `ports`, `type`, `memberClusters`. Exists only while at least one
/// contributor is NoConflict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    pub service_name: String,
    pub namespace: String,
    /// Port definition of the winning export.
    pub ports: Vec<ServicePort>,
    /// Service type of the winning export.
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// Sorted cluster ids of all current NoConflict contributors.
    pub member_clusters: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::Protocol;

    #[test]
    fn wire_shape_is_stable() {
        let record = ImportRecord {
            service_name: "app".into(),
            namespace: "work".into(),
            ports: vec![ServicePort {
                name: Some("http".into()),
                protocol: Protocol::Tcp,
                port: 80,
                target_port: Some(8080),
            }],
            service_type: ServiceType::ClusterSetIP,
            member_clusters: vec!["east".into(), "west".into()],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["serviceName"], "app");
        assert_eq!(json["type"], "ClusterSetIP");
        assert_eq!(json["memberClusters"][1], "west");
        assert_eq!(json["ports"][0]["targetPort"], 8080);
    }
}
