use std::sync::Arc;

use fleet_config::CloudConfig;
use fleet_engine::ReconcileEngine;
use fleet_store::StateStore;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::ClientError;
use crate::http::CloudHttp;
use crate::registration::{register_if_needed, RegistrationRequest};
use crate::{poll, report};

/// Owns the three periodic tasks against the cloud controller. Registration
/// runs synchronously during `start`; poll and report run as independent
/// background tasks sharing one shutdown signal.
pub struct StateExchangeClient {
    shutdown: Arc<Notify>,
    poll_task: JoinHandle<()>,
    report_task: JoinHandle<()>,
}

impl StateExchangeClient {
    /// Registers the device if needed, then spawns the poll and report
    /// loops. Returns an error without spawning anything if registration
    /// fails permanently.
    pub async fn start(
        config: &CloudConfig,
        store: Arc<dyn StateStore>,
        engine: Arc<ReconcileEngine>,
        registration: RegistrationRequest,
    ) -> Result<Self, ClientError> {
        let http = CloudHttp::new(&config.api_endpoint);
        register_if_needed(&http, &store, registration).await?;

        let shutdown = Arc::new(Notify::new());

        let poll_task = tokio::spawn(poll::run_poll_loop(
            http.clone(),
            store.clone(),
            engine.clone(),
            config.poll_interval,
            shutdown.clone(),
        ));

        let report_task = tokio::spawn(report::run_report_loop(
            http,
            store,
            engine,
            config.report_interval,
            config.metrics_interval,
            shutdown.clone(),
        ));

        info!("state-exchange client started");
        Ok(Self { shutdown, poll_task, report_task })
    }

    /// Notifies both tasks and waits for them to observe shutdown and
    /// return. Each task finishes its in-flight request before exiting.
    pub async fn shutdown(self) {
        self.shutdown.notify_waiters();
        let _ = tokio::join!(self.poll_task, self.report_task);
    }
}
