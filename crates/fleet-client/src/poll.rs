use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use fleet_engine::ReconcileEngine;
use fleet_store::StateStore;
use reqwest::StatusCode;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::http::{map_transport, CloudHttp};

/// Last-known ETag, shared with nothing else — the poll task is the only
/// writer and reader.
#[derive(Default)]
struct EtagCache(Mutex<Option<String>>);

impl EtagCache {
    fn get(&self) -> Option<String> {
        self.0.lock().unwrap().clone()
    }

    fn set(&self, etag: Option<String>) {
        *self.0.lock().unwrap() = etag;
    }
}

/// Runs the poll loop until `shutdown` is notified. One request per tick;
/// ticks do not overlap (the loop body awaits end-to-end before sleeping
/// again), independent of the report task.
pub async fn run_poll_loop(
    http: CloudHttp,
    store: Arc<dyn StateStore>,
    engine: Arc<ReconcileEngine>,
    poll_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let etag = EtagCache::default();
    let mut backoff = Backoff::new();

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("poll loop observed shutdown");
                return;
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        let provisioned = matches!(store.get_identity().await, Ok(Some(identity)) if identity.provisioned);
        if !provisioned {
            continue;
        }

        match poll_once(&http, &store, &engine, &etag).await {
            Ok(()) => backoff.reset(),
            Err(err) => {
                let delay = backoff.next_delay();
                warn!(error = %err, delay_ms = delay.as_millis() as u64, "poll failed, backing off");
                tokio::select! {
                    _ = shutdown.notified() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn poll_once(
    http: &CloudHttp,
    store: &Arc<dyn StateStore>,
    engine: &Arc<ReconcileEngine>,
    etag: &EtagCache,
) -> Result<(), ClientError> {
    let identity = store
        .get_identity()
        .await?
        .ok_or(ClientError::NotProvisioned)?;
    let uuid = identity.uuid.as_deref().ok_or(ClientError::NotProvisioned)?;

    let mut req = http.client().get(http.url(&format!("/device/{uuid}/state")));
    if let Some(last_etag) = etag.get() {
        req = req.header("If-None-Match", last_etag);
    }

    let resp = req.send().await.map_err(map_transport)?;
    let status = resp.status();

    if status == StatusCode::NOT_MODIFIED {
        debug!("poll: target unchanged (304)");
        return Ok(());
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CloudHttp::classify(status, &body));
    }

    let new_etag = resp.headers().get("ETag").and_then(|v| v.to_str().ok()).map(str::to_string);
    let body = resp.bytes().await.map_err(map_transport)?;

    let snapshot = fleet_config::parse_state_document(uuid, &body)?;
    engine.set_target(snapshot).await?;
    etag.set(new_etag);
    Ok(())
}
