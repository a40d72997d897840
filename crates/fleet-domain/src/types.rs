use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Integer app identifier, unique within a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AppId(pub i64);

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer service identifier, unique within its parent app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub i64);

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::No
    }
}

impl std::fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle state of a service's container, as reported by the runtime adapter.
///
/// `Failed` is not a runtime-reported state; the engine assigns it to a
/// service whose provisioning step failed permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Created,
    Running,
    Exited,
    Restarting,
    Dead,
    Unknown,
    Failed,
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServiceStatus::Created => "created",
            ServiceStatus::Running => "running",
            ServiceStatus::Exited => "exited",
            ServiceStatus::Restarting => "restarting",
            ServiceStatus::Dead => "dead",
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

// ── ServiceConfig ──────────────────────────────────────────────────────────────

/// Desired container shape for one service.
///
/// Equality is deep-structural: `environment`/`labels` ignore key order,
/// `ports`/`volumes` compare in sequence order, `networks` is a true set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// `registry/name:tag`.
    pub image: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    /// `"host:container[/proto]"` entries, in declared order.
    #[serde(default)]
    pub ports: Vec<String>,
    /// `"name:mount"` (named volume, owned by the parent app) or
    /// `"/host:mount"` (bind mount) entries, in declared order.
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub networks: BTreeSet<String>,
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub network_mode: Option<String>,
}

impl ServiceConfig {
    /// Named volumes referenced by this config. Bind mounts (entries whose
    /// name starts with `/`) are excluded — they are not app-owned.
    pub fn named_volumes(&self) -> impl Iterator<Item = &str> {
        self.volumes.iter().filter_map(|v| {
            let name = v.split(':').next().unwrap_or(v);
            if name.starts_with('/') {
                None
            } else {
                Some(name)
            }
        })
    }
}

// ── Service ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub app_id: AppId,
    pub service_id: ServiceId,
    /// DNS-label-safe within the parent app.
    pub service_name: String,
    /// Must match `config.image`.
    pub image_name: String,
    pub config: ServiceConfig,

    // ── Runtime attributes — populated only on Current-state services ──────
    pub container_id: Option<String>,
    pub status: Option<ServiceStatus>,
    /// Human-readable reason when `status == Some(Failed)`.
    pub failure_reason: Option<String>,
    /// SHA-256 of the canonical JSON of `config`, stamped after a successful
    /// apply. Lets the differ and engine detect config drift without a deep
    /// structural comparison on every reconcile tick.
    pub desired_hash: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Service {
    /// A Target-shaped service: no runtime attributes.
    pub fn desired(
        app_id: AppId,
        service_id: ServiceId,
        service_name: impl Into<String>,
        image_name: impl Into<String>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            app_id,
            service_id,
            service_name: service_name.into(),
            image_name: image_name.into(),
            config,
            container_id: None,
            status: None,
            failure_reason: None,
            desired_hash: None,
            created_at: None,
            updated_at: None,
        }
    }
}

// ── App ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub app_id: AppId,
    /// DNS-label-safe.
    pub app_name: String,
    /// Startup/shutdown ordering when no explicit dependencies are given.
    pub services: Vec<Service>,
}

impl App {
    pub fn service(&self, service_id: ServiceId) -> Option<&Service> {
        self.services.iter().find(|s| s.service_id == service_id)
    }

    /// All named volumes referenced by any service in this app.
    pub fn referenced_volumes(&self) -> BTreeSet<String> {
        self.services
            .iter()
            .flat_map(|s| s.config.named_volumes().map(String::from))
            .collect()
    }

    /// All networks referenced by any service in this app.
    pub fn referenced_networks(&self) -> BTreeSet<String> {
        self.services
            .iter()
            .flat_map(|s| s.config.networks.iter().cloned())
            .collect()
    }
}

// ── StateSnapshot ─────────────────────────────────────────────────────────────

/// The root record. Two named values exist per device: Target (desired) and
/// Current (observed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateSnapshot {
    pub apps: HashMap<i64, App>,
    /// Opaque, not reconciled by the differ — passed through verbatim from
    /// Target to Current on acceptance.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl StateSnapshot {
    pub fn empty() -> Self {
        Self {
            apps: HashMap::new(),
            config: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn app(&self, app_id: AppId) -> Option<&App> {
        self.apps.get(&app_id.0)
    }
}

// ── DeviceIdentity ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Opaque, stable once assigned by the cloud at registration.
    pub uuid: Option<String>,
    pub device_name: String,
    pub device_type: String,
    pub provisioned: bool,
    pub api_endpoint_url: String,
    pub registered_at: Option<DateTime<Utc>>,
}

impl DeviceIdentity {
    pub fn unprovisioned(
        device_name: impl Into<String>,
        device_type: impl Into<String>,
        api_endpoint_url: impl Into<String>,
    ) -> Self {
        Self {
            uuid: None,
            device_name: device_name.into(),
            device_type: device_type.into(),
            provisioned: false,
            api_endpoint_url: api_endpoint_url.into(),
            registered_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_volumes_excludes_bind_mounts() {
        let cfg = ServiceConfig {
            image: "x".into(),
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec!["data:/var/data".into(), "/etc/foo:/etc/foo".into()],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::No,
            labels: HashMap::new(),
            network_mode: None,
        };
        let named: Vec<&str> = cfg.named_volumes().collect();
        assert_eq!(named, vec!["data"]);
    }

    #[test]
    fn restart_policy_round_trips() {
        for rp in [
            RestartPolicy::No,
            RestartPolicy::Always,
            RestartPolicy::OnFailure,
            RestartPolicy::UnlessStopped,
        ] {
            let json = serde_json::to_string(&rp).unwrap();
            let back: RestartPolicy = serde_json::from_str(&json).unwrap();
            assert_eq!(rp, back);
        }
    }

    #[test]
    fn state_snapshot_json_round_trip_is_identity() {
        let mut snap = StateSnapshot::empty();
        let cfg = ServiceConfig {
            image: "nginx:alpine".into(),
            environment: HashMap::new(),
            ports: vec!["8080:80".into()],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::Always,
            labels: HashMap::new(),
            network_mode: None,
        };
        let svc = Service::desired(AppId(1001), ServiceId(1), "nginx", "nginx:alpine", cfg);
        snap.apps.insert(
            1001,
            App {
                app_id: AppId(1001),
                app_name: "web".into(),
                services: vec![svc],
            },
        );

        let json = serde_json::to_string(&snap).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }
}
