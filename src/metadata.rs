//! Reporting metadata for a provisioned service.
//!
//! Consumed by sample reporting, never by the engine itself. Job
//! properties are flattened to a `key=value` comma list so downstream
//! consumers see one string per service.

use std::collections::BTreeMap;

/// Descriptive metadata for one service instance.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServiceMetadata {
    /// Backend service type (for example `unmanaged_cluster`).
    pub service_type: String,
    /// Service software version, when known.
    pub version: Option<String>,
    /// Identity of the service instance.
    pub cluster_id: String,
    /// Machine shape of the worker group, when known.
    pub machine_shape: Option<String>,
    /// Number of workers, when known.
    pub worker_count: Option<usize>,
    /// Provisioning zone, when known.
    pub zone: Option<String>,
    /// Job properties applied to every submission.
    pub job_properties: BTreeMap<String, String>,
}

impl ServiceMetadata {
    /// Flattens a property map into a `key=value` comma list.
    #[must_use]
    pub fn flatten_properties(properties: &BTreeMap<String, String>) -> String {
        properties
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Returns the metadata as `key=value` pairs for reporting.
    #[must_use]
    pub fn pairs(&self) -> Vec<(String, String)> {
        let version = self.version.clone().unwrap_or_else(|| String::from("default"));
        let mut pairs = vec![
            (String::from("service"), self.service_type.clone()),
            (String::from("service_version"), version.clone()),
            (
                String::from("service_type_version"),
                format!("{}_{version}", self.service_type),
            ),
            (String::from("cluster_id"), self.cluster_id.clone()),
        ];
        if let Some(shape) = &self.machine_shape {
            pairs.push((String::from("cluster_shape"), shape.clone()));
        }
        if let Some(count) = self.worker_count {
            pairs.push((String::from("cluster_size"), count.to_string()));
        }
        if let Some(zone) = &self.zone {
            pairs.push((String::from("zone"), zone.clone()));
        }
        pairs.push((
            String::from("job_properties"),
            Self::flatten_properties(&self.job_properties),
        ));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::ServiceMetadata;

    #[test]
    fn flatten_properties_joins_sorted_pairs() {
        let mut properties = BTreeMap::new();
        properties.insert(String::from("b"), String::from("2"));
        properties.insert(String::from("a"), String::from("1"));
        assert_eq!(
            ServiceMetadata::flatten_properties(&properties),
            "a=1,b=2"
        );
    }

    #[test]
    fn pairs_reports_default_version_and_combined_type() {
        let metadata = ServiceMetadata {
            service_type: String::from("unmanaged_cluster"),
            cluster_id: String::from("gantry-1"),
            worker_count: Some(3),
            ..ServiceMetadata::default()
        };
        let pairs = metadata.pairs();
        assert!(pairs.contains(&(String::from("service_version"), String::from("default"))));
        assert!(pairs.contains(&(
            String::from("service_type_version"),
            String::from("unmanaged_cluster_default")
        )));
        assert!(pairs.contains(&(String::from("cluster_size"), String::from("3"))));
    }
}
