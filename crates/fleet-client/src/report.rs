use std::sync::Arc;
use std::time::{Duration, Instant};

use fleet_config::SystemMetrics;
use fleet_engine::{EngineEvent, ReconcileEngine};
use fleet_store::StateStore;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::http::{map_transport, CloudHttp};

/// Resolution at which the report loop re-checks whether it's due; real
/// throttling is done against `report_interval`/`metrics_interval`, not this
/// tick rate.
const TICK: Duration = Duration::from_secs(1);

struct ReportState {
    last_reported_at: Option<Instant>,
    last_payload: Option<Vec<u8>>,
    last_metrics_at: Option<Instant>,
}

impl ReportState {
    fn new() -> Self {
        Self { last_reported_at: None, last_payload: None, last_metrics_at: None }
    }

    fn due(&self, report_interval: Duration) -> bool {
        match self.last_reported_at {
            None => true,
            Some(t) => t.elapsed() >= report_interval,
        }
    }

    fn metrics_due(&self, metrics_interval: Duration) -> bool {
        match self.last_metrics_at {
            None => true,
            Some(t) => t.elapsed() >= metrics_interval,
        }
    }
}

/// Runs the report loop until `shutdown` is notified. Also fires immediately
/// whenever the engine emits `ReconcileCompleted`, in addition to its own
/// interval ticker; the two sources never overlap a request because each
/// pass awaits the previous one to completion before looping.
pub async fn run_report_loop(
    http: CloudHttp,
    store: Arc<dyn StateStore>,
    engine: Arc<ReconcileEngine>,
    report_interval: Duration,
    metrics_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut events = engine.subscribe();
    let mut state = ReportState::new();
    let mut backoff = Backoff::new();

    loop {
        let triggered = tokio::select! {
            _ = shutdown.notified() => {
                debug!("report loop observed shutdown");
                return;
            }
            _ = tokio::time::sleep(TICK) => false,
            event = events.recv() => matches!(event, Ok(EngineEvent::ReconcileCompleted(_))),
        };

        let provisioned = matches!(store.get_identity().await, Ok(Some(identity)) if identity.provisioned);
        if !provisioned {
            continue;
        }

        if !triggered && !state.due(report_interval) {
            continue;
        }

        match report_once(&http, &store, &engine, &mut state, metrics_interval).await {
            Ok(()) => backoff.reset(),
            Err(err) => {
                let delay = backoff.next_delay();
                warn!(error = %err, delay_ms = delay.as_millis() as u64, "report failed, backing off");
                tokio::select! {
                    _ = shutdown.notified() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn report_once(
    http: &CloudHttp,
    store: &Arc<dyn StateStore>,
    engine: &Arc<ReconcileEngine>,
    state: &mut ReportState,
    metrics_interval: Duration,
) -> Result<(), ClientError> {
    let identity = store.get_identity().await?.ok_or(ClientError::NotProvisioned)?;
    let uuid = identity.uuid.as_deref().ok_or(ClientError::NotProvisioned)?;

    let current = engine.get_current().await?;
    let include_metrics = state.metrics_due(metrics_interval);
    let metrics = if include_metrics { Some(serde_json::to_value(SystemMetrics::collect())?) } else { None };

    let doc = fleet_config::build_report_document(uuid, &current, metrics);
    let payload = serde_json::to_vec(&doc)?;

    if !include_metrics && state.last_payload.as_deref() == Some(payload.as_slice()) {
        debug!("report: payload unchanged, skipping");
        return Ok(());
    }

    let resp = http
        .client()
        .patch(http.url("/device/state"))
        .header("Content-Type", "application/json")
        .body(payload.clone())
        .send()
        .await
        .map_err(map_transport)?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CloudHttp::classify(status, &body));
    }

    state.last_reported_at = Some(Instant::now());
    state.last_payload = Some(payload);
    if include_metrics {
        state.last_metrics_at = Some(Instant::now());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::DeviceIdentity;
    use fleet_runtime::MockRuntimeAdapter;
    use fleet_store::InMemoryStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provisioned_store() -> Arc<dyn StateStore> {
        let store: Arc<dyn StateStore> = Arc::new(InMemoryStore::new());
        store
            .set_identity(&DeviceIdentity {
                uuid: Some("dev-1".into()),
                device_name: "edge".into(),
                device_type: "gateway".into(),
                provisioned: true,
                api_endpoint_url: "http://example.invalid".into(),
                registered_at: None,
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn first_report_always_sends() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH")).and(path("/device/state")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let http = CloudHttp::new(server.uri());
        let store = provisioned_store().await;
        let engine = ReconcileEngine::new(store.clone(), Arc::new(MockRuntimeAdapter::new()));
        let mut state = ReportState::new();

        report_once(&http, &store, &engine, &mut state, Duration::from_secs(300)).await.unwrap();
        assert!(state.last_payload.is_some());
    }

    #[tokio::test]
    async fn unchanged_payload_is_skipped_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH")).and(path("/device/state")).respond_with(ResponseTemplate::new(200)).mount(&server).await;

        let http = CloudHttp::new(server.uri());
        let store = provisioned_store().await;
        let engine = ReconcileEngine::new(store.clone(), Arc::new(MockRuntimeAdapter::new()));
        let mut state = ReportState::new();

        report_once(&http, &store, &engine, &mut state, Duration::from_secs(300)).await.unwrap();
        let sent_after_first = server.received_requests().await.unwrap().len();

        report_once(&http, &store, &engine, &mut state, Duration::from_secs(300)).await.unwrap();
        let sent_after_second = server.received_requests().await.unwrap().len();

        assert_eq!(sent_after_first, sent_after_second);
    }
}
