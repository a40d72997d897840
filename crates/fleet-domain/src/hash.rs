use sha2::{Digest, Sha256};

/// Recursively sorts object keys so that two JSON values that are
/// semantically equal but differ in key order hash identically.
pub fn sort_json_keys(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, serde_json::Value> =
                std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), sort_json_keys(v));
            }
            serde_json::Value::Object(sorted.into_iter().collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_json_keys).collect())
        }
        other => other.clone(),
    }
}

/// SHA-256 of the canonical (key-sorted) JSON encoding of `value`, as a lowercase
/// hex string. Used to detect config drift without a deep structural diff.
pub fn compute_desired_hash<T: serde::Serialize>(value: &T) -> String {
    let json = serde_json::to_value(value).expect("serialize to json");
    let canonical = sort_json_keys(&json);
    let bytes = serde_json::to_vec(&canonical).expect("serialize canonical json");
    let digest = Sha256::digest(&bytes);
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RestartPolicy, ServiceConfig};
    use std::collections::{BTreeSet, HashMap};

    #[test]
    fn hash_is_stable_under_map_reconstruction() {
        let mut env_a = HashMap::new();
        env_a.insert("A".to_string(), "1".to_string());
        env_a.insert("B".to_string(), "2".to_string());

        let mut env_b = HashMap::new();
        env_b.insert("B".to_string(), "2".to_string());
        env_b.insert("A".to_string(), "1".to_string());

        let cfg_a = ServiceConfig {
            image: "x:1".into(),
            environment: env_a,
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::No,
            labels: HashMap::new(),
            network_mode: None,
        };
        let cfg_b = ServiceConfig {
            image: "x:1".into(),
            environment: env_b,
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::No,
            labels: HashMap::new(),
            network_mode: None,
        };

        assert_eq!(compute_desired_hash(&cfg_a), compute_desired_hash(&cfg_b));
    }

    #[test]
    fn hash_changes_with_image() {
        let cfg_a = ServiceConfig {
            image: "x:1".into(),
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::No,
            labels: HashMap::new(),
            network_mode: None,
        };
        let mut cfg_b = cfg_a.clone();
        cfg_b.image = "x:2".into();
        assert_ne!(compute_desired_hash(&cfg_a), compute_desired_hash(&cfg_b));
    }
}
