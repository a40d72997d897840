use async_trait::async_trait;
use fleet_domain::{AppId, Service, ServiceId, ServiceStatus};
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// A container observed on the daemon carrying the `managed = "true"` label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedContainer {
    pub container_id: String,
    pub app_id: AppId,
    pub app_name: String,
    pub service_id: ServiceId,
    pub service_name: String,
    pub image: String,
    pub status: ServiceStatus,
}

/// Adapts the abstract reconciliation operations to a concrete container
/// daemon (a Docker-compatible Engine API reachable over a socket or TCP).
/// This is the only component permitted to label managed resources.
///
/// Labels applied to every created container/volume/network:
/// `managed = "true"`, `app-id`, `app-name`, and — containers only —
/// `service-id`, `service-name`. The adapter never issues a destructive call
/// against a resource lacking the `managed` label.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync + 'static {
    /// Every container carrying the managed label, with id, labels, image,
    /// and current state.
    async fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, RuntimeError>;

    /// Ensures `image` is present locally. Idempotent.
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Creates a stopped container from `service.config`, applying managed
    /// labels and naming it `<app_name>_<service_name>`. Returns an opaque id.
    /// Fails with `RuntimeError::Conflict` if a container by that name
    /// already exists — the caller must remove it first.
    async fn create_container(&self, app_name: &str, service: &Service) -> Result<String, RuntimeError>;

    /// Starts a created container. Idempotent: starting an already-running
    /// container is a no-op.
    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Requests a graceful stop; after `grace_seconds` issues a force-stop.
    /// Idempotent on an already-stopped container.
    async fn stop_container(&self, container_id: &str, grace_seconds: u32) -> Result<(), RuntimeError>;

    /// Removes a stopped container. With `force`, stops first. Not-found is
    /// treated as success.
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<(), RuntimeError>;

    /// Creates `<app_id>_<name>` if absent. Idempotent.
    async fn create_network(&self, app_id: AppId, name: &str, config: &serde_json::Value) -> Result<(), RuntimeError>;

    /// Removes `<app_id>_<name>` if present. Idempotent.
    async fn remove_network(&self, app_id: AppId, name: &str) -> Result<(), RuntimeError>;

    /// Creates `<app_id>_<name>` if absent. Idempotent.
    async fn create_volume(&self, app_id: AppId, name: &str, config: &serde_json::Value) -> Result<(), RuntimeError>;

    /// Removes `<app_id>_<name>` if present. Idempotent.
    async fn remove_volume(&self, app_id: AppId, name: &str) -> Result<(), RuntimeError>;

    /// Current status, mapping runtime-specific states onto the closed
    /// `ServiceStatus` set.
    async fn inspect_container(&self, container_id: &str) -> Result<ServiceStatus, RuntimeError>;
}
