use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fleet_client::{RegistrationRequest, StateExchangeClient};
use fleet_config::CloudConfig;
use fleet_engine::ReconcileEngine;
use fleet_runtime::{HttpRuntimeAdapter, RuntimeAdapter};
use fleet_store::{RedbStore, StateStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::output;

const LOCAL_API_BIND: &str = "127.0.0.1:7700";

// ── Run ───────────────────────────────────────────────────────────────────────

pub async fn run() -> Result<()> {
    // 1. Open the store.
    let config = CloudConfig::from_env().context("loading configuration")?;
    let store: Arc<dyn StateStore> =
        Arc::new(RedbStore::open(&PathBuf::from(&config.database_path)).with_context(|| {
            format!("opening state store at {}", config.database_path)
        })?);

    // 2. Load identity, register if needed.
    let identity = store.get_identity().await.context("loading device identity")?;
    let provisioned = identity.as_ref().map(|i| i.provisioned).unwrap_or(false);
    if !provisioned {
        tracing::info!("device not provisioned, registering");
    }

    // 3/4. Construct the Runtime Adapter and probe liveness before anything
    // depends on it.
    let runtime: Arc<dyn RuntimeAdapter> = Arc::new(HttpRuntimeAdapter::new(&config.runtime_socket));
    runtime
        .list_managed_containers()
        .await
        .context("runtime adapter unreachable at boot")?;

    // 5. Construct the Reconciliation Engine.
    let engine = ReconcileEngine::new(store.clone(), runtime);

    // 6. Construct the State-Exchange Client; this performs registration if
    // the device isn't provisioned yet, per the startup sequence.
    let registration = build_registration_request()?;
    let client = StateExchangeClient::start(&config, store.clone(), engine.clone(), registration)
        .await
        .context("starting state-exchange client")?;

    // 7. Start the engine's own reconcile timer and the local control API.
    let auto_reconcile = engine.clone().spawn_auto_reconcile(config.reconcile_interval);

    let token = Arc::new(resolve_or_generate_token()?);
    let app = fleet_api::build_app(store, engine.clone(), token);
    let listener = tokio::net::TcpListener::bind(LOCAL_API_BIND)
        .await
        .with_context(|| format!("binding local control API on {LOCAL_API_BIND}"))?;
    tracing::info!(addr = LOCAL_API_BIND, "local control API listening");

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => result.context("local control API server error")?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    // Shutdown: stop accepting new reconciliations/client ticks, let the
    // in-flight ones reach a step boundary, then exit.
    engine.request_shutdown();
    client.shutdown().await;
    auto_reconcile.abort();
    Ok(())
}

fn build_registration_request() -> Result<RegistrationRequest> {
    let provisioning_key = std::env::var("PROVISIONING_KEY").unwrap_or_default();
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".into());
    Ok(RegistrationRequest {
        provisioning_key,
        device_name: hostname.clone(),
        device_type: std::env::var("DEVICE_TYPE").unwrap_or_else(|_| "gateway".into()),
        hostname,
        os_version: std::env::consts::OS.to_string(),
        agent_version: env!("CARGO_PKG_VERSION").to_string(),
        mac_address: std::env::var("DEVICE_MAC_ADDRESS").ok(),
    })
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigOverrides {
    api_endpoint: Option<String>,
}

pub fn config_set_api(url: String) -> Result<()> {
    let path = overrides_path();
    let mut overrides = read_overrides(&path).unwrap_or_default();
    overrides.api_endpoint = Some(url.clone());
    write_overrides(&path, &overrides)?;
    println!("Persisted CLOUD_API_ENDPOINT override: {url}");
    Ok(())
}

pub fn config_show() -> Result<()> {
    let overrides = read_overrides(&overrides_path()).unwrap_or_default();
    if let Some(url) = &overrides.api_endpoint {
        std::env::set_var("CLOUD_API_ENDPOINT", url);
    }

    match CloudConfig::from_env() {
        Ok(cfg) => {
            println!("api_endpoint:       {}", cfg.api_endpoint);
            println!("poll_interval_ms:   {}", cfg.poll_interval.as_millis());
            println!("report_interval_ms: {}", cfg.report_interval.as_millis());
            println!("metrics_interval_ms:{}", cfg.metrics_interval.as_millis());
            println!("reconcile_interval_ms:{}", cfg.reconcile_interval.as_millis());
            println!("database_path:      {}", cfg.database_path);
            println!("runtime_socket:     {}", cfg.runtime_socket);
            println!("log_level:          {}", cfg.log_level);
        }
        Err(e) => {
            println!("configuration incomplete: {e}");
        }
    }
    Ok(())
}

fn overrides_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".fleet-agent").join("config.json")
}

fn read_overrides(path: &PathBuf) -> Result<ConfigOverrides> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_overrides(path: &PathBuf, overrides: &ConfigOverrides) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(overrides)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status() -> Result<()> {
    let token = resolve_or_generate_token()?;
    let base = format!("http://{LOCAL_API_BIND}");
    let client = reqwest::Client::new();

    let health = client
        .get(format!("{base}/health"))
        .bearer_auth(&token)
        .send()
        .await
        .with_context(|| format!("failed to reach local control API at {base}"))?;
    let health_ok = health.status().is_success();

    let state: serde_json::Value = client
        .get(format!("{base}/v1/state"))
        .bearer_auth(&token)
        .send()
        .await
        .with_context(|| format!("failed to reach local control API at {base}"))?
        .json()
        .await
        .context("parsing /v1/state response")?;

    print!("{}", output::render_status_text(health_ok, &state));
    if !health_ok {
        bail!("engine unreachable");
    }
    Ok(())
}

// ── Version ───────────────────────────────────────────────────────────────────

pub fn version() {
    println!("fleet-agent {}", env!("CARGO_PKG_VERSION"));
}

// ── Local API token ───────────────────────────────────────────────────────────

fn token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".fleet-agent").join("token")
}

/// Reuses a previously generated token so CLI invocations across process
/// restarts keep working against the running `run` process's control API.
fn resolve_or_generate_token() -> Result<String> {
    let path = token_path();
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let token = generate_token();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(&path, &token).with_context(|| format!("writing {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("setting permissions on {}", path.display()))?;
    }

    Ok(token)
}

fn generate_token() -> String {
    let a = Uuid::new_v4().to_string().replace('-', "");
    let b = Uuid::new_v4().to_string().replace('-', "");
    format!("{a}{b}")
}
