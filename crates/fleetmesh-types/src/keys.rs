//! Canonical key layout for fleet state.
//!
//! Hub store:
//!
//! ```text
//! fleet/exports/{namespace}/{service}/{cluster}   -> ExportRecord
//! fleet/imports/{namespace}/{service}             -> ImportRecord
//! ```
//!
//! Member stores:
//!
//! ```text
//! fleet/intents/{namespace}/{service}             -> ExportIntent
//! fleet/endpoints/{namespace}/{service}/{cluster} -> EndpointSnapshot
//! ```
//!
//! The sibling set for a service name is one prefix scan of
//! [`export_records_prefix`]. Object names must not contain the separator;
//! [`validate_object_name`] enforces the grammar.

use snafu::Snafu;

/// Separator between key path segments.
pub const KEY_SEPARATOR: char = '/';

const EXPORTS_ROOT: &str = "fleet/exports";
const IMPORTS_ROOT: &str = "fleet/imports";
const INTENTS_ROOT: &str = "fleet/intents";
const ENDPOINTS_ROOT: &str = "fleet/endpoints";

/// Violations of the key grammar.
#[derive(Debug, Clone, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum KeyError {
    /// Names must be non-empty.
    #[snafu(display("empty object name"))]
    Empty,

    /// Names must not contain the key separator.
    #[snafu(display("object name '{name}' contains '{KEY_SEPARATOR}'"))]
    ContainsSeparator { name: String },
}

/// Validate a namespace, service name or cluster id for use in keys.
pub fn validate_object_name(name: &str) -> Result<(), KeyError> {
    if name.is_empty() {
        return Err(KeyError::Empty);
    }
    if name.contains(KEY_SEPARATOR) {
        return Err(KeyError::ContainsSeparator { name: name.to_string() });
    }
    Ok(())
}

/// Hub key of one member's export record.
pub fn export_record_key(namespace: &str, service: &str, cluster: &str) -> String {
    format!("{EXPORTS_ROOT}/{namespace}/{service}/{cluster}")
}

/// Hub prefix covering all sibling export records for a service name.
pub fn export_records_prefix(namespace: &str, service: &str) -> String {
    format!("{EXPORTS_ROOT}/{namespace}/{service}/")
}

/// Hub key of the aggregated import record for a service name.
pub fn import_record_key(namespace: &str, service: &str) -> String {
    format!("{IMPORTS_ROOT}/{namespace}/{service}")
}

/// Member key of an export intent.
pub fn export_intent_key(namespace: &str, service: &str) -> String {
    format!("{INTENTS_ROOT}/{namespace}/{service}")
}

/// Member key of the endpoint snapshot sourced from `cluster`.
pub fn endpoint_snapshot_key(namespace: &str, service: &str, cluster: &str) -> String {
    format!("{ENDPOINTS_ROOT}/{namespace}/{service}/{cluster}")
}

/// Member prefix covering all endpoint snapshots for a service name.
pub fn endpoint_snapshots_prefix(namespace: &str, service: &str) -> String {
    format!("{ENDPOINTS_ROOT}/{namespace}/{service}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_under_sibling_prefix() {
        let key = export_record_key("work", "app", "east");
        assert!(key.starts_with(&export_records_prefix("work", "app")));
    }

    #[test]
    fn sibling_prefix_does_not_capture_longer_names() {
        // "app" siblings must not include "app2" records.
        let other = export_record_key("work", "app2", "east");
        assert!(!other.starts_with(&export_records_prefix("work", "app")));
    }

    #[test]
    fn name_with_separator_rejected() {
        assert!(matches!(
            validate_object_name("work/app"),
            Err(KeyError::ContainsSeparator { .. })
        ));
        assert_eq!(validate_object_name(""), Err(KeyError::Empty));
        assert!(validate_object_name("app-2").is_ok());
    }
}
