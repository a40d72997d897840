use fleet_domain::{AppId, Service, ServiceId};
use serde::{Deserialize, Serialize};

/// One action in an ordered reconciliation plan. Each variant carries exactly
/// the fields its executor (the Reconciliation Engine, via the Runtime
/// Adapter) needs — no lookups back into the snapshot are required at
/// execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    DownloadImage { app_id: AppId, image: String },
    CreateNetwork { app_id: AppId, name: String, config: serde_json::Value },
    CreateVolume { app_id: AppId, name: String, config: serde_json::Value },
    /// Implies `CreateContainer` then `StartContainer` at execution time.
    /// Carries `app_name` alongside `service` because the Runtime Adapter's
    /// container-naming scheme (`<app_name>_<service_name>`) needs it and
    /// `Service` itself does not carry its parent app's name.
    StartService { app_id: AppId, app_name: String, service: Service },
    StopService { app_id: AppId, service_id: ServiceId, container_id: String },
    RemoveService { app_id: AppId, service_id: ServiceId, container_id: String },
    RemoveNetwork { app_id: AppId, name: String },
    RemoveVolume { app_id: AppId, name: String },
}

/// An ordered sequence of [`Step`]s. Sequential execution of a `Plan`
/// transforms Current into Target while preserving the invariants in
/// `fleet_domain`.
pub type Plan = Vec<Step>;
