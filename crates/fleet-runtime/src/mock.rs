use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use fleet_domain::{AppId, Service, ServiceId, ServiceStatus};
use tracing::debug;

use crate::driver::{ManagedContainer, RuntimeAdapter};
use crate::error::RuntimeError;

#[derive(Debug, Clone)]
struct ContainerRecord {
    container_id: String,
    app_id: AppId,
    app_name: String,
    service_id: ServiceId,
    service_name: String,
    image: String,
    status: ServiceStatus,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    containers: HashMap<String, ContainerRecord>,
    networks: HashSet<String>,
    volumes: HashSet<String>,
    pulled_images: HashSet<String>,
}

/// Deterministic, no-I/O [`RuntimeAdapter`] used as the differ/engine test
/// double. Synthesizes sequential container ids and never touches any real
/// daemon.
#[derive(Debug, Default)]
pub struct MockRuntimeAdapter {
    inner: Mutex<Inner>,
}

impl MockRuntimeAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuntimeAdapter for MockRuntimeAdapter {
    async fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, RuntimeError> {
        let guard = self.inner.lock().unwrap();
        Ok(guard
            .containers
            .values()
            .map(|c| ManagedContainer {
                container_id: c.container_id.clone(),
                app_id: c.app_id,
                app_name: c.app_name.clone(),
                service_id: c.service_id,
                service_name: c.service_name.clone(),
                image: c.image.clone(),
                status: c.status,
            })
            .collect())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        debug!(image, "MockRuntimeAdapter: pull_image");
        self.inner.lock().unwrap().pulled_images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, app_name: &str, service: &Service) -> Result<String, RuntimeError> {
        let name = format!("{}_{}", app_name, service.service_name);
        let mut guard = self.inner.lock().unwrap();
        if guard.containers.values().any(|c| format!("{}_{}", c.app_name, c.service_name) == name) {
            return Err(RuntimeError::Conflict(name));
        }
        guard.next_id += 1;
        let container_id = format!("mock-{}", guard.next_id);
        guard.containers.insert(
            container_id.clone(),
            ContainerRecord {
                container_id: container_id.clone(),
                app_id: service.app_id,
                app_name: app_name.to_string(),
                service_id: service.service_id,
                service_name: service.service_name.clone(),
                image: service.image_name.clone(),
                status: ServiceStatus::Created,
            },
        );
        Ok(container_id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        let mut guard = self.inner.lock().unwrap();
        let record = guard
            .containers
            .get_mut(container_id)
            .ok_or_else(|| RuntimeError::Internal(format!("no such container {container_id}")))?;
        record.status = ServiceStatus::Running;
        Ok(())
    }

    async fn stop_container(&self, container_id: &str, _grace_seconds: u32) -> Result<(), RuntimeError> {
        let mut guard = self.inner.lock().unwrap();
        if let Some(record) = guard.containers.get_mut(container_id) {
            record.status = ServiceStatus::Exited;
        }
        Ok(())
    }

    async fn remove_container(&self, container_id: &str, _force: bool) -> Result<(), RuntimeError> {
        self.inner.lock().unwrap().containers.remove(container_id);
        Ok(())
    }

    async fn create_network(&self, app_id: AppId, name: &str, _config: &serde_json::Value) -> Result<(), RuntimeError> {
        self.inner.lock().unwrap().networks.insert(format!("{}_{}", app_id, name));
        Ok(())
    }

    async fn remove_network(&self, app_id: AppId, name: &str) -> Result<(), RuntimeError> {
        self.inner.lock().unwrap().networks.remove(&format!("{}_{}", app_id, name));
        Ok(())
    }

    async fn create_volume(&self, app_id: AppId, name: &str, _config: &serde_json::Value) -> Result<(), RuntimeError> {
        self.inner.lock().unwrap().volumes.insert(format!("{}_{}", app_id, name));
        Ok(())
    }

    async fn remove_volume(&self, app_id: AppId, name: &str) -> Result<(), RuntimeError> {
        self.inner.lock().unwrap().volumes.remove(&format!("{}_{}", app_id, name));
        Ok(())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ServiceStatus, RuntimeError> {
        let guard = self.inner.lock().unwrap();
        Ok(guard.containers.get(container_id).map(|c| c.status).unwrap_or(ServiceStatus::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::{RestartPolicy, ServiceConfig};
    use std::collections::{BTreeSet, HashMap as Map};

    fn service(app_id: i64, service_id: i64, name: &str, image: &str) -> Service {
        let cfg = ServiceConfig {
            image: image.into(),
            environment: Map::new(),
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::Always,
            labels: Map::new(),
            network_mode: None,
        };
        Service::desired(AppId(app_id), ServiceId(service_id), name, image, cfg)
    }

    #[tokio::test]
    async fn create_start_inspect_round_trip() {
        let adapter = MockRuntimeAdapter::new();
        let svc = service(1, 1, "web", "nginx:alpine");
        let id = adapter.create_container("myapp", &svc).await.unwrap();
        assert_eq!(adapter.inspect_container(&id).await.unwrap(), ServiceStatus::Created);
        adapter.start_container(&id).await.unwrap();
        assert_eq!(adapter.inspect_container(&id).await.unwrap(), ServiceStatus::Running);
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict() {
        let adapter = MockRuntimeAdapter::new();
        let svc = service(1, 1, "web", "nginx:alpine");
        adapter.create_container("myapp", &svc).await.unwrap();
        let err = adapter.create_container("myapp", &svc).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Conflict(_)));
    }

    #[tokio::test]
    async fn remove_is_idempotent_on_missing() {
        let adapter = MockRuntimeAdapter::new();
        adapter.remove_container("does-not-exist", true).await.unwrap();
    }

    #[tokio::test]
    async fn list_managed_containers_reflects_state() {
        let adapter = MockRuntimeAdapter::new();
        let svc = service(1, 1, "web", "nginx:alpine");
        let id = adapter.create_container("myapp", &svc).await.unwrap();
        adapter.start_container(&id).await.unwrap();

        let listed = adapter.list_managed_containers().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ServiceStatus::Running);
    }

    #[tokio::test]
    async fn network_and_volume_create_remove_idempotent() {
        let adapter = MockRuntimeAdapter::new();
        adapter.create_network(AppId(1), "frontend", &serde_json::Value::Null).await.unwrap();
        adapter.create_network(AppId(1), "frontend", &serde_json::Value::Null).await.unwrap();
        adapter.remove_network(AppId(1), "frontend").await.unwrap();
        adapter.remove_network(AppId(1), "frontend").await.unwrap();

        adapter.create_volume(AppId(1), "data", &serde_json::Value::Null).await.unwrap();
        adapter.remove_volume(AppId(1), "data").await.unwrap();
    }
}
