use std::sync::Arc;

use fleet_domain::DeviceIdentity;
use fleet_store::StateStore;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::http::{map_transport, CloudHttp};

/// Fields posted once at provisioning time (§4.5 device registration).
pub struct RegistrationRequest {
    pub provisioning_key: String,
    pub device_name: String,
    pub device_type: String,
    pub hostname: String,
    pub os_version: String,
    pub agent_version: String,
    pub mac_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    uuid: String,
}

/// Registers the device if its identity is not yet provisioned, retrying
/// transient failures with backoff. Permanent failures (invalid key, quota)
/// are not retried — the caller treats them as fatal to startup.
pub async fn register_if_needed(
    http: &CloudHttp,
    store: &Arc<dyn StateStore>,
    request: RegistrationRequest,
) -> Result<DeviceIdentity, ClientError> {
    if let Some(identity) = store.get_identity().await? {
        if identity.provisioned {
            return Ok(identity);
        }
    }

    let mut backoff = Backoff::new();
    loop {
        match try_register(http, &request).await {
            Ok(uuid) => {
                let identity = DeviceIdentity {
                    uuid: Some(uuid),
                    device_name: request.device_name,
                    device_type: request.device_type,
                    provisioned: true,
                    api_endpoint_url: http.url(""),
                    registered_at: Some(chrono::Utc::now()),
                };
                store.set_identity(&identity).await?;
                info!(uuid = ?identity.uuid, "device registered");
                return Ok(identity);
            }
            Err(err) if err.is_retryable() => {
                let delay = backoff.next_delay();
                warn!(error = %err, delay_ms = delay.as_millis() as u64, "registration attempt failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Err(ClientError::RegistrationRejected(err.to_string()));
            }
        }
    }
}

async fn try_register(http: &CloudHttp, request: &RegistrationRequest) -> Result<String, ClientError> {
    let body = json!({
        "provisioning_key": request.provisioning_key,
        "device_name": request.device_name,
        "device_type": request.device_type,
        "hostname": request.hostname,
        "os_version": request.os_version,
        "agent_version": request.agent_version,
        "mac_address": request.mac_address,
    });

    let resp = http
        .client()
        .post(http.url("/device/register"))
        .json(&body)
        .send()
        .await
        .map_err(map_transport)?;

    let status = resp.status();
    let text = resp.text().await.map_err(map_transport)?;
    if !status.is_success() {
        return Err(CloudHttp::classify(status, &text));
    }

    let parsed: RegisterResponse = serde_json::from_str(&text)
        .map_err(|e| ClientError::Unexpected { status: status.as_u16(), body: e.to_string() })?;
    Ok(parsed.uuid)
}
