use std::collections::BTreeSet;

use fleet_domain::{App, AppId, RestartPolicy, Service, ServiceConfig, ServiceId, StateSnapshot};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawApp, RawDeviceState, RawService, RawStateDocument};

/// Parses a `GET /device/{uuid}/state` response body and converts it into a
/// [`StateSnapshot`]. The response is a single top-level object keyed by
/// `uuid`; any other entries present are ignored.
pub fn parse_state_document(uuid: &str, bytes: &[u8]) -> Result<StateSnapshot, ConfigError> {
    let doc: RawStateDocument = serde_json::from_slice(bytes)?;
    let body = doc.get(uuid).ok_or_else(|| ConfigError::MissingDeviceEntry { uuid: uuid.to_string() })?;
    convert_device_state(body)
}

fn convert_device_state(raw: &RawDeviceState) -> Result<StateSnapshot, ConfigError> {
    let mut apps = std::collections::HashMap::with_capacity(raw.apps.len());
    for (id_str, raw_app) in &raw.apps {
        let app_id = parse_app_id(id_str)?;
        let app = convert_app(app_id, raw_app)?;
        apps.insert(app_id.0, app);
    }
    Ok(StateSnapshot { apps, config: raw.config.clone() })
}

fn convert_app(app_id: AppId, raw: &RawApp) -> Result<App, ConfigError> {
    let services = raw
        .services
        .iter()
        .map(|s| convert_service(app_id, s))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(App {
        app_id,
        app_name: raw.app_name.clone(),
        services,
    })
}

fn convert_service(app_id: AppId, raw: &RawService) -> Result<Service, ConfigError> {
    let restart_policy = match raw.restart_policy.as_deref() {
        None => RestartPolicy::No,
        Some(s) => parse_restart_policy(s)?,
    };

    let config = ServiceConfig {
        image: raw.image.clone(),
        environment: raw.environment.clone(),
        ports: raw.ports.clone(),
        volumes: raw.volumes.clone(),
        networks: raw.networks.iter().cloned().collect::<BTreeSet<_>>(),
        restart_policy,
        labels: raw.labels.clone(),
        network_mode: raw.network_mode.clone(),
    };

    Ok(Service::desired(app_id, ServiceId(raw.service_id), raw.service_name.clone(), raw.image.clone(), config))
}

fn parse_app_id(raw: &str) -> Result<AppId, ConfigError> {
    raw.parse::<i64>()
        .map(AppId)
        .map_err(|_| ConfigError::Conversion { field: "apps key".into(), message: format!("'{raw}' is not a valid app id") })
}

fn parse_restart_policy(s: &str) -> Result<RestartPolicy, ConfigError> {
    match s {
        "no" => Ok(RestartPolicy::No),
        "always" => Ok(RestartPolicy::Always),
        "on-failure" => Ok(RestartPolicy::OnFailure),
        "unless-stopped" => Ok(RestartPolicy::UnlessStopped),
        other => Err(ConfigError::Conversion { field: "restart_policy".into(), message: format!("unknown restart policy '{other}'") }),
    }
}

/// Builds the `PATCH /device/state` request body from a device's current
/// snapshot, ready for serialisation.
pub fn build_report_document(uuid: &str, snapshot: &StateSnapshot, metrics: Option<serde_json::Value>) -> RawStateDocument {
    debug!(uuid, apps = snapshot.apps.len(), "building state report document");
    let apps = snapshot
        .apps
        .iter()
        .map(|(id, app)| (id.to_string(), convert_app_to_raw(app)))
        .collect();

    let mut doc = RawStateDocument::new();
    doc.insert(uuid.to_string(), RawDeviceState { apps, config: snapshot.config.clone(), metrics });
    doc
}

fn convert_app_to_raw(app: &App) -> RawApp {
    RawApp {
        app_name: app.app_name.clone(),
        services: app.services.iter().map(convert_service_to_raw).collect(),
    }
}

fn convert_service_to_raw(service: &Service) -> RawService {
    RawService {
        service_id: service.service_id.0,
        service_name: service.service_name.clone(),
        image: service.image_name.clone(),
        environment: service.config.environment.clone(),
        ports: service.config.ports.clone(),
        volumes: service.config.volumes.clone(),
        networks: service.config.networks.iter().cloned().collect(),
        restart_policy: Some(service.config.restart_policy.to_string()),
        labels: service.config.labels.clone(),
        network_mode: service.config.network_mode.clone(),
    }
}
