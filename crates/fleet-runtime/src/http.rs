use std::time::Duration;

use async_trait::async_trait;
use fleet_domain::{AppId, Service, ServiceId, ServiceStatus};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::driver::{ManagedContainer, RuntimeAdapter};
use crate::error::RuntimeError;

const MANAGED_LABEL: &str = "fleet.managed";

/// Per-operation timeout overrides (§5): an image pull can legitimately run
/// long on a slow registry; start/stop wait out the daemon's own grace
/// period handling. Everything else uses the client's default.
const PULL_TIMEOUT: Duration = Duration::from_secs(600);
const START_STOP_TIMEOUT: Duration = Duration::from_secs(120);

fn managed_labels(app_id: AppId, app_name: &str, service: Option<(&ServiceId, &str)>) -> serde_json::Value {
    let mut labels = serde_json::Map::new();
    labels.insert(MANAGED_LABEL.to_string(), json!("true"));
    labels.insert("fleet.app-id".to_string(), json!(app_id.0.to_string()));
    labels.insert("fleet.app-name".to_string(), json!(app_name));
    if let Some((service_id, service_name)) = service {
        labels.insert("fleet.service-id".to_string(), json!(service_id.0.to_string()));
        labels.insert("fleet.service-name".to_string(), json!(service_name));
    }
    serde_json::Value::Object(labels)
}

/// Talks to a Docker-compatible Engine API. `base_url` points at the daemon's
/// HTTP endpoint (a reverse proxy in front of the daemon's unix socket, or the
/// daemon's own TCP listener) — see `RUNTIME_SOCKET` in `fleet-config`.
///
/// Most calls use the client's default 30s timeout; `pull_image` and the
/// start/stop container calls override it per-request with the longer
/// budgets §5 assigns those operations.
pub struct HttpRuntimeAdapter {
    client: Client,
    base_url: String,
}

impl HttpRuntimeAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { client, base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn classify(status: StatusCode, body: &str) -> RuntimeError {
        match status {
            StatusCode::NOT_FOUND => RuntimeError::ImageNotFound(body.to_string()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RuntimeError::AuthRequired(body.to_string()),
            StatusCode::CONFLICT => RuntimeError::Conflict(body.to_string()),
            s if s.is_server_error() => RuntimeError::Transport(format!("{s}: {body}")),
            s => RuntimeError::Internal(format!("{s}: {body}")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "Labels", default)]
    labels: std::collections::HashMap<String, String>,
}

fn parse_status(raw: &str) -> ServiceStatus {
    match raw {
        "created" => ServiceStatus::Created,
        "running" => ServiceStatus::Running,
        "exited" => ServiceStatus::Exited,
        "restarting" => ServiceStatus::Restarting,
        "dead" => ServiceStatus::Dead,
        _ => ServiceStatus::Unknown,
    }
}

#[async_trait]
impl RuntimeAdapter for HttpRuntimeAdapter {
    async fn list_managed_containers(&self) -> Result<Vec<ManagedContainer>, RuntimeError> {
        let filters = json!({ "label": [format!("{MANAGED_LABEL}=true")] }).to_string();
        let resp = self
            .client
            .get(self.url("/containers/json"))
            .query(&[("all", "true"), ("filters", &filters)])
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| RuntimeError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::classify(status, &body));
        }

        let summaries: Vec<ContainerSummary> =
            serde_json::from_str(&body).map_err(|e| RuntimeError::Internal(e.to_string()))?;

        Ok(summaries
            .into_iter()
            .filter_map(|s| {
                let app_id: i64 = s.labels.get("fleet.app-id")?.parse().ok()?;
                let service_id: i64 = s.labels.get("fleet.service-id")?.parse().ok()?;
                Some(ManagedContainer {
                    container_id: s.id,
                    app_id: AppId(app_id),
                    app_name: s.labels.get("fleet.app-name").cloned().unwrap_or_default(),
                    service_id: ServiceId(service_id),
                    service_name: s.labels.get("fleet.service-name").cloned().unwrap_or_default(),
                    image: s.image,
                    status: parse_status(&s.state),
                })
            })
            .collect())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        debug!(image, "pulling image");
        let resp = self
            .client
            .post(self.url("/images/create"))
            .query(&[("fromImage", image)])
            .timeout(PULL_TIMEOUT)
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify(status, &body));
        }
        // The daemon streams progress as newline-delimited JSON; draining the
        // body to completion is how we know the pull finished.
        let _ = resp.bytes().await.map_err(|e| RuntimeError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn create_container(&self, app_name: &str, service: &Service) -> Result<String, RuntimeError> {
        let name = format!("{}_{}", app_name, service.service_name);
        let labels = managed_labels(service.app_id, app_name, Some((&service.service_id, &service.service_name)));
        let body = json!({
            "Image": service.image_name,
            "Env": service.config.environment.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>(),
            "Labels": labels,
        });

        let resp = self
            .client
            .post(self.url("/containers/create"))
            .query(&[("name", name.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| RuntimeError::Transport(e.to_string()))?;
        if status == StatusCode::CONFLICT {
            return Err(RuntimeError::Conflict(name));
        }
        if !status.is_success() {
            return Err(Self::classify(status, &text));
        }

        #[derive(Deserialize)]
        struct Created {
            #[serde(rename = "Id")]
            id: String,
        }
        let created: Created = serde_json::from_str(&text).map_err(|e| RuntimeError::Internal(e.to_string()))?;
        Ok(created.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), RuntimeError> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{container_id}/start")))
            .timeout(START_STOP_TIMEOUT)
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        // 304 = already started, idempotent no-op.
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn stop_container(&self, container_id: &str, grace_seconds: u32) -> Result<(), RuntimeError> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{container_id}/stop")))
            .query(&[("t", grace_seconds.to_string())])
            .timeout(START_STOP_TIMEOUT)
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<(), RuntimeError> {
        let resp = self
            .client
            .delete(self.url(&format!("/containers/{container_id}")))
            .query(&[("force", force.to_string())])
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        // Not-found is success: removal is idempotent.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn create_network(&self, app_id: AppId, name: &str, _config: &serde_json::Value) -> Result<(), RuntimeError> {
        let full_name = format!("{app_id}_{name}");
        let labels = managed_labels(app_id, name, None);
        let resp = self
            .client
            .post(self.url("/networks/create"))
            .json(&json!({ "Name": full_name, "Labels": labels }))
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn remove_network(&self, app_id: AppId, name: &str) -> Result<(), RuntimeError> {
        let full_name = format!("{app_id}_{name}");
        let resp = self
            .client
            .delete(self.url(&format!("/networks/{full_name}")))
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn create_volume(&self, app_id: AppId, name: &str, _config: &serde_json::Value) -> Result<(), RuntimeError> {
        let full_name = format!("{app_id}_{name}");
        let labels = managed_labels(app_id, name, None);
        let resp = self
            .client
            .post(self.url("/volumes/create"))
            .json(&json!({ "Name": full_name, "Labels": labels }))
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn remove_volume(&self, app_id: AppId, name: &str) -> Result<(), RuntimeError> {
        let full_name = format!("{app_id}_{name}");
        let resp = self
            .client
            .delete(self.url(&format!("/volumes/{full_name}")))
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Self::classify(status, &body))
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ServiceStatus, RuntimeError> {
        let resp = self
            .client
            .get(self.url(&format!("/containers/{container_id}/json")))
            .send()
            .await
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            warn!(container_id, "inspect: container vanished out-of-band");
            return Ok(ServiceStatus::Unknown);
        }
        let body = resp.text().await.map_err(|e| RuntimeError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::classify(status, &body));
        }

        #[derive(Deserialize)]
        struct Inspect {
            #[serde(rename = "State")]
            state: InspectState,
        }
        #[derive(Deserialize)]
        struct InspectState {
            #[serde(rename = "Status")]
            status: String,
        }
        let inspect: Inspect = serde_json::from_str(&body).map_err(|e| RuntimeError::Internal(e.to_string()))?;
        Ok(parse_status(&inspect.state.status))
    }
}
