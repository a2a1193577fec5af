//! Export intents: a member cluster's declared desire to expose a service.

use serde::Deserialize;
use serde::Serialize;
use snafu::Snafu;

use crate::condition::Condition;
use crate::keys::validate_object_name;

/// Transport protocol of an exported port.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// A single exported service port.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Optional port name; required to be unique within a spec when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: Protocol,
    pub port: u16,
    /// Backend port, when different from `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
}

/// How the aggregated service is addressed by importing clusters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceType {
    /// A single fleet-wide virtual IP.
    #[default]
    ClusterSetIP,
    /// Per-endpoint DNS, no virtual IP.
    Headless,
}

/// The exported definition of a service.
///
/// Two sibling exports are compatible exactly when their specs are
/// structurally equal; this type's `PartialEq` is the conflict check.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportSpec {
    pub ports: Vec<ServicePort>,
    pub service_type: ServiceType,
}

/// Validation failures for an export spec.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum SpecError {
    /// An export with no ports cannot be aggregated.
    #[snafu(display("export spec has no ports"))]
    NoPorts,

    /// Two ports with the same (protocol, port) pair.
    #[snafu(display("duplicate port {port} in export spec"))]
    DuplicatePort { port: u16 },

    /// Two named ports sharing a name.
    #[snafu(display("duplicate port name '{name}' in export spec"))]
    DuplicatePortName { name: String },

    /// Object names must be non-empty and must not contain the key separator.
    #[snafu(display("invalid object name '{name}'"))]
    InvalidName { name: String },
}

/// Validate an export spec.
///
/// Invalid specs are not retried by the resolver; they surface as a terminal
/// `InvalidSpec` verdict until the owner submits a new generation.
pub fn validate_export_spec(spec: &ExportSpec) -> Result<(), SpecError> {
    if spec.ports.is_empty() {
        return Err(SpecError::NoPorts);
    }

    let mut seen_ports = std::collections::BTreeSet::new();
    let mut seen_names = std::collections::BTreeSet::new();
    for port in &spec.ports {
        if !seen_ports.insert((port.protocol, port.port)) {
            return Err(SpecError::DuplicatePort { port: port.port });
        }
        if let Some(name) = &port.name {
            if !seen_names.insert(name.clone()) {
                return Err(SpecError::DuplicatePortName { name: name.clone() });
            }
        }
    }

    Ok(())
}

/// Status of a member-side export intent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ExportStatus {
    /// Find the condition of the given type.
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.condition_type == condition_type)
    }

    /// Insert or replace the condition of `cond`'s type.
    ///
    /// `lastTransitionTime` is preserved from the existing condition when the
    /// status did not change, so condition history stays meaningful.
    pub fn set_condition(&mut self, mut cond: Condition) {
        match self.conditions.iter_mut().find(|c| c.condition_type == cond.condition_type) {
            Some(existing) => {
                if existing.status == cond.status {
                    cond.last_transition_time = existing.last_transition_time;
                }
                *existing = cond;
            }
            None => self.conditions.push(cond),
        }
    }
}

/// A member cluster's declared desire to expose a local service to the fleet.
///
/// Owned by user/service action on the member cluster; the export intent
/// reconciler mirrors it into the hub, and the status propagator writes the
/// `Conflict` condition back onto it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportIntent {
    /// Cluster this intent originates from.
    pub cluster_id: String,
    pub namespace: String,
    pub name: String,
    /// Bumped by the owner on every spec change; conditions record the
    /// generation they were computed against.
    pub generation: u64,
    pub spec: ExportSpec,
    /// Reachable addresses of the backing service, mirrored to the hub for
    /// endpoint fan-out. Not part of the conflict comparison.
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub status: ExportStatus,
}

impl ExportIntent {
    /// Validate the identifying names against the key grammar.
    pub fn validate_names(&self) -> Result<(), SpecError> {
        for name in [&self.cluster_id, &self.namespace, &self.name] {
            if validate_object_name(name).is_err() {
                return Err(SpecError::InvalidName { name: name.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::CONDITION_TYPE_CONFLICT;
    use crate::condition::ConditionStatus;
    use crate::condition::REASON_CONFLICT_FOUND;
    use crate::condition::REASON_NO_CONFLICT_FOUND;

    fn port(port: u16) -> ServicePort {
        ServicePort {
            name: None,
            protocol: Protocol::Tcp,
            port,
            target_port: None,
        }
    }

    #[test]
    fn empty_spec_rejected() {
        let spec = ExportSpec::default();
        assert_eq!(validate_export_spec(&spec), Err(SpecError::NoPorts));
    }

    #[test]
    fn duplicate_port_rejected() {
        let spec = ExportSpec {
            ports: vec![port(80), port(80)],
            service_type: ServiceType::ClusterSetIP,
        };
        assert_eq!(validate_export_spec(&spec), Err(SpecError::DuplicatePort { port: 80 }));
    }

    #[test]
    fn same_port_different_protocol_allowed() {
        let spec = ExportSpec {
            ports: vec![port(53), ServicePort {
                name: None,
                protocol: Protocol::Udp,
                port: 53,
                target_port: None,
            }],
            service_type: ServiceType::ClusterSetIP,
        };
        assert!(validate_export_spec(&spec).is_ok());
    }

    #[test]
    fn duplicate_port_name_rejected() {
        let named = |name: &str, p: u16| ServicePort {
            name: Some(name.to_string()),
            protocol: Protocol::Tcp,
            port: p,
            target_port: None,
        };
        let spec = ExportSpec {
            ports: vec![named("http", 80), named("http", 8080)],
            service_type: ServiceType::ClusterSetIP,
        };
        assert!(matches!(
            validate_export_spec(&spec),
            Err(SpecError::DuplicatePortName { .. })
        ));
    }

    fn conflict_cond(status: ConditionStatus, reason: &str, transition: u64) -> Condition {
        Condition {
            condition_type: CONDITION_TYPE_CONFLICT.to_string(),
            status,
            reason: reason.to_string(),
            message: String::new(),
            observed_generation: 1,
            last_transition_time: transition,
        }
    }

    #[test]
    fn set_condition_preserves_transition_time_when_status_unchanged() {
        let mut status = ExportStatus::default();
        status.set_condition(conflict_cond(ConditionStatus::True, REASON_CONFLICT_FOUND, 100));
        status.set_condition(conflict_cond(ConditionStatus::True, REASON_CONFLICT_FOUND, 200));

        let cond = status.condition(CONDITION_TYPE_CONFLICT).unwrap();
        assert_eq!(cond.last_transition_time, 100);
    }

    #[test]
    fn set_condition_updates_transition_time_on_status_change() {
        let mut status = ExportStatus::default();
        status.set_condition(conflict_cond(ConditionStatus::True, REASON_CONFLICT_FOUND, 100));
        status.set_condition(conflict_cond(ConditionStatus::False, REASON_NO_CONFLICT_FOUND, 200));

        let cond = status.condition(CONDITION_TYPE_CONFLICT).unwrap();
        assert_eq!(cond.last_transition_time, 200);
        assert_eq!(cond.status, ConditionStatus::False);
    }

    #[test]
    fn intent_name_with_separator_rejected() {
        let intent = ExportIntent {
            cluster_id: "east".into(),
            namespace: "work".into(),
            name: "app/evil".into(),
            generation: 1,
            spec: ExportSpec {
                ports: vec![port(80)],
                service_type: ServiceType::ClusterSetIP,
            },
            endpoints: vec![],
            status: ExportStatus::default(),
        };
        assert!(matches!(intent.validate_names(), Err(SpecError::InvalidName { .. })));
    }
}
