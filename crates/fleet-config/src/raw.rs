use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Wire shape of the cloud's `GET /device/{uuid}/state` and `PATCH
/// /device/state` bodies: a single top-level object keyed by device uuid.
pub type RawStateDocument = HashMap<String, RawDeviceState>;

#[derive(Debug, Deserialize, Serialize)]
pub struct RawDeviceState {
    #[serde(default)]
    pub apps: HashMap<String, RawApp>,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Present only on outbound `PATCH /device/state` reports.
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawApp {
    pub app_name: String,
    #[serde(default)]
    pub services: Vec<RawService>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawService {
    pub service_id: i64,
    pub service_name: String,
    pub image: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub networks: Vec<String>,
    /// One of `no`, `always`, `on-failure`, `unless-stopped`. Absent means `no`.
    #[serde(default)]
    pub restart_policy: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub network_mode: Option<String>,
}
