use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fleet_differ::{Plan, Step};
use fleet_domain::{validate_snapshot, App, AppId, Service, ServiceConfig, ServiceStatus, StateSnapshot};
use fleet_runtime::RuntimeAdapter;
use fleet_store::StateStore;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::events::{EngineEvent, FailureKind, PlanOutcome, ReconcileSummary, StepResult};

/// `StopContainer`'s grace period before the adapter force-stops (§5). The
/// differ doesn't carry this per-step, so the engine applies one policy-wide
/// value.
const STOP_GRACE_SECONDS: u32 = 10;

const EVENTS_CAPACITY: usize = 256;

/// Owns the single-writer invariant over plan execution. One `reconcile()`
/// runs at a time; a concurrent caller is told `AlreadyRunning` and does not
/// queue — the next tick or the next `set_target` picks up any outstanding
/// diff.
pub struct ReconcileEngine {
    store: Arc<dyn StateStore>,
    runtime: Arc<dyn RuntimeAdapter>,
    events: broadcast::Sender<EngineEvent>,
    reconciling: Mutex<()>,
    shutdown: Arc<AtomicBool>,
}

impl ReconcileEngine {
    pub fn new(store: Arc<dyn StateStore>, runtime: Arc<dyn RuntimeAdapter>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENTS_CAPACITY);
        Arc::new(Self {
            store,
            runtime,
            events,
            reconciling: Mutex::new(()),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Subscribers receive by-value clones of every event; they cannot
    /// mutate engine state through this channel.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Signals the step loop to stop at the next step boundary. Checked, not
    /// awaited: the in-flight step still runs to completion, only the next
    /// one is skipped.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Replaces Target and persists. Does not execute — execution is driven
    /// by the engine's own loop.
    pub async fn set_target(&self, target: StateSnapshot) -> Result<(), EngineError> {
        validate_snapshot(&target, true)?;
        self.store.save_target(&target).await?;
        let _ = self.events.send(EngineEvent::TargetChanged);
        Ok(())
    }

    pub async fn get_target(&self) -> Result<StateSnapshot, EngineError> {
        Ok(self.store.load_target().await?)
    }

    pub async fn get_current(&self) -> Result<StateSnapshot, EngineError> {
        Ok(self.store.load_current().await?)
    }

    /// Round-trips the runtime adapter to confirm it is reachable, for the
    /// local control API's `/health` endpoint.
    pub async fn health(&self) -> Result<(), EngineError> {
        self.runtime.list_managed_containers().await?;
        Ok(())
    }

    /// Explicit trigger. Returns `AlreadyRunning` immediately, without
    /// queueing, if a reconciliation is already in flight.
    pub async fn reconcile(&self) -> Result<PlanOutcome, EngineError> {
        let _guard = match self.reconciling.try_lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(PlanOutcome::AlreadyRunning),
        };

        let started_at = Utc::now();
        let _ = self.events.send(EngineEvent::ReconcileStarted);

        let target = self.store.load_target().await?;
        let mut current = self.resync_current().await?;
        let plan = fleet_differ::diff(&current, &target);

        if plan.is_empty() {
            current.config = target.config.clone();
            self.store.save_current(&current).await?;
            let summary = finished_summary(started_at, 0, 0);
            let _ = self.events.send(EngineEvent::ReconcileCompleted(summary.clone()));
            return Ok(PlanOutcome::Completed(summary));
        }

        self.execute_plan(&mut current, &target, plan, started_at).await
    }

    async fn execute_plan(
        &self,
        current: &mut StateSnapshot,
        target: &StateSnapshot,
        plan: Plan,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<PlanOutcome, EngineError> {
        let steps_total = plan.len();
        let mut applied = 0usize;
        // Apps whose remaining steps are skipped after a permanent failure;
        // steps for other apps keep executing.
        let mut isolated_apps: BTreeSet<i64> = BTreeSet::new();

        for (idx, step) in plan.iter().enumerate() {
            if self.shutdown.load(Ordering::Relaxed) {
                self.store.save_current(current).await?;
                let summary = finished_summary(started_at, applied, steps_total);
                return Ok(PlanOutcome::Cancelled(summary));
            }

            let app_id = step_app_id(step);
            if isolated_apps.contains(&app_id.0) {
                continue;
            }

            let _ = self.events.send(EngineEvent::StepApplied { step: step.clone(), result: StepResult::InProgress });

            match self.apply_step(current, target, step).await {
                Ok(()) => {
                    applied += 1;
                    let _ = self.events.send(EngineEvent::StepApplied { step: step.clone(), result: StepResult::Succeeded });
                }
                Err(err) => {
                    let _ = self.events.send(EngineEvent::StepApplied {
                        step: step.clone(),
                        result: StepResult::Failed(err.to_string()),
                    });

                    if err.is_transient() {
                        warn!(step = idx, error = %err, "transient failure, aborting reconcile for a fresh resync next tick");
                        self.store.save_current(current).await?;
                        let summary = finished_summary(started_at, applied, steps_total);
                        let _ = self.events.send(EngineEvent::ReconcileFailed { kind: FailureKind::Transient, step_index: idx });
                        return Ok(PlanOutcome::Failed { summary, step_index: idx, kind: FailureKind::Transient });
                    }

                    warn!(step = idx, error = %err, app_id = %app_id, "permanent failure, isolating app for rest of this plan");
                    mark_service_failed(current, target, step, err.to_string());
                    isolated_apps.insert(app_id.0);
                }
            }
        }

        current.config = target.config.clone();
        self.store.save_current(current).await?;
        let summary = finished_summary(started_at, applied, steps_total);

        // Isolated per-app failures are recorded on the affected services
        // (status/failure_reason) but the plan itself ran to completion, so
        // this is always `Completed`, not `Failed` — matters for
        // fleet-client's immediate-report trigger, which only fires on
        // `ReconcileCompleted`.
        let _ = self.events.send(EngineEvent::ReconcileCompleted(summary.clone()));
        Ok(PlanOutcome::Completed(summary))
    }

    async fn apply_step(
        &self,
        current: &mut StateSnapshot,
        target: &StateSnapshot,
        step: &Step,
    ) -> Result<(), fleet_runtime::RuntimeError> {
        match step {
            Step::DownloadImage { image, .. } => self.runtime.pull_image(image).await,
            Step::CreateNetwork { app_id, name, config } => self.runtime.create_network(*app_id, name, config).await,
            Step::CreateVolume { app_id, name, config } => self.runtime.create_volume(*app_id, name, config).await,
            Step::StartService { app_id, app_name, service } => {
                let container_id = self.runtime.create_container(app_name, service).await?;
                self.runtime.start_container(&container_id).await?;
                record_service_started(current, target, *app_id, app_name, service, container_id);
                Ok(())
            }
            Step::StopService { container_id, .. } => self.runtime.stop_container(container_id, STOP_GRACE_SECONDS).await,
            Step::RemoveService { app_id, service_id, container_id } => {
                self.runtime.remove_container(container_id, false).await?;
                record_service_removed(current, target, *app_id, *service_id);
                Ok(())
            }
            Step::RemoveNetwork { app_id, name } => self.runtime.remove_network(*app_id, name).await,
            Step::RemoveVolume { app_id, name } => self.runtime.remove_volume(*app_id, name).await,
        }
    }

    /// Re-syncs Current from the Runtime Adapter's view of managed containers
    /// before diffing, so out-of-band changes (a container someone stopped
    /// by hand, a crash loop) are reflected. Volumes and networks are not
    /// resynced this way — `ListManagedContainers` only enumerates containers.
    async fn resync_current(&self) -> Result<StateSnapshot, EngineError> {
        let mut current = self.store.load_current().await?;
        let managed = self.runtime.list_managed_containers().await?;

        let mut seen: BTreeSet<(i64, i64)> = BTreeSet::new();
        for mc in &managed {
            seen.insert((mc.app_id.0, mc.service_id.0));
            let status = match self.runtime.inspect_container(&mc.container_id).await {
                Ok(s) => s,
                Err(err) => {
                    debug!(container_id = %mc.container_id, error = %err, "inspect failed during resync, keeping last-known status");
                    mc.status
                }
            };

            let app = current.apps.entry(mc.app_id.0).or_insert_with(|| App {
                app_id: mc.app_id,
                app_name: mc.app_name.clone(),
                services: Vec::new(),
            });

            match app.services.iter_mut().find(|s| s.service_id == mc.service_id) {
                Some(svc) => {
                    svc.container_id = Some(mc.container_id.clone());
                    svc.status = Some(status);
                }
                None => {
                    let mut svc = Service::desired(mc.app_id, mc.service_id, &mc.service_name, &mc.image, placeholder_config(&mc.image));
                    svc.container_id = Some(mc.container_id.clone());
                    svc.status = Some(status);
                    app.services.push(svc);
                }
            }
        }

        for app in current.apps.values_mut() {
            app.services.retain(|s| seen.contains(&(s.app_id.0, s.service_id.0)));
        }
        current.apps.retain(|_, app| !app.services.is_empty());

        Ok(current)
    }

    /// Starts the auto-reconciliation timer. Each tick invokes `reconcile()`
    /// when the device is provisioned; `AlreadyRunning` from an overlapping
    /// explicit trigger is a normal, silent outcome. Ends when
    /// `request_shutdown` is called.
    pub fn spawn_auto_reconcile(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.shutdown.load(Ordering::Relaxed) {
                    debug!("auto-reconcile loop observed shutdown, exiting");
                    return;
                }

                let provisioned = matches!(self.store.get_identity().await, Ok(Some(identity)) if identity.provisioned);
                if !provisioned {
                    continue;
                }

                match self.reconcile().await {
                    Ok(PlanOutcome::AlreadyRunning) => debug!("auto-reconcile tick skipped, reconciliation already running"),
                    Ok(outcome) => info!(?outcome, "auto-reconcile tick complete"),
                    Err(err) => warn!(error = %err, "auto-reconcile tick failed"),
                }
            }
        })
    }
}

fn finished_summary(started_at: chrono::DateTime<Utc>, steps_applied: usize, steps_total: usize) -> ReconcileSummary {
    ReconcileSummary { steps_applied, steps_total, started_at, finished_at: Utc::now() }
}

fn step_app_id(step: &Step) -> AppId {
    match step {
        Step::DownloadImage { app_id, .. }
        | Step::CreateNetwork { app_id, .. }
        | Step::CreateVolume { app_id, .. }
        | Step::StartService { app_id, .. }
        | Step::StopService { app_id, .. }
        | Step::RemoveService { app_id, .. }
        | Step::RemoveNetwork { app_id, .. }
        | Step::RemoveVolume { app_id, .. } => *app_id,
    }
}

fn placeholder_config(image: &str) -> ServiceConfig {
    ServiceConfig {
        image: image.to_string(),
        environment: Default::default(),
        ports: Vec::new(),
        volumes: Vec::new(),
        networks: BTreeSet::new(),
        restart_policy: Default::default(),
        labels: Default::default(),
        network_mode: None,
    }
}

fn record_service_started(
    current: &mut StateSnapshot,
    _target: &StateSnapshot,
    app_id: AppId,
    app_name: &str,
    desired: &Service,
    container_id: String,
) {
    let now = Utc::now();
    let mut svc = desired.clone();
    svc.container_id = Some(container_id);
    svc.status = Some(ServiceStatus::Running);
    svc.failure_reason = None;
    svc.desired_hash = Some(fleet_domain::compute_desired_hash(&svc.config));
    svc.created_at.get_or_insert(now);
    svc.updated_at = Some(now);

    let app = current.apps.entry(app_id.0).or_insert_with(|| App {
        app_id,
        app_name: app_name.to_string(),
        services: Vec::new(),
    });

    match app.services.iter_mut().find(|s| s.service_id == svc.service_id) {
        Some(existing) => *existing = svc,
        None => app.services.push(svc),
    }
}

fn record_service_removed(current: &mut StateSnapshot, target: &StateSnapshot, app_id: AppId, service_id: fleet_domain::ServiceId) {
    if let Some(app) = current.apps.get_mut(&app_id.0) {
        app.services.retain(|s| s.service_id != service_id);
        if app.services.is_empty() && target.app(app_id).is_none() {
            current.apps.remove(&app_id.0);
        }
    }
}

/// Marks the service a failed step belongs to as `Failed` in Current, with
/// `reason`, synthesizing a minimal entry from Target if this is the
/// service's first-ever apply attempt (nothing to update yet in Current).
fn mark_service_failed(current: &mut StateSnapshot, target: &StateSnapshot, step: &Step, reason: String) {
    let (app_id, service_id) = match step {
        Step::StartService { app_id, service, .. } => (*app_id, Some(service.service_id)),
        Step::StopService { app_id, service_id, .. } | Step::RemoveService { app_id, service_id, .. } => (*app_id, Some(*service_id)),
        Step::DownloadImage { app_id, image } => {
            let service_id = target
                .app(*app_id)
                .and_then(|app| app.services.iter().find(|s| &s.image_name == image))
                .map(|s| s.service_id);
            (*app_id, service_id)
        }
        Step::CreateNetwork { app_id, .. }
        | Step::CreateVolume { app_id, .. }
        | Step::RemoveNetwork { app_id, .. }
        | Step::RemoveVolume { app_id, .. } => (*app_id, None),
    };

    let Some(service_id) = service_id else { return };

    if let Some(app) = current.apps.get_mut(&app_id.0) {
        if let Some(svc) = app.services.iter_mut().find(|s| s.service_id == service_id) {
            svc.status = Some(ServiceStatus::Failed);
            svc.failure_reason = Some(reason);
            svc.updated_at = Some(Utc::now());
            return;
        }
    }

    if let Some(target_app) = target.app(app_id) {
        if let Some(target_svc) = target_app.service(service_id) {
            let mut svc = target_svc.clone();
            svc.status = Some(ServiceStatus::Failed);
            svc.failure_reason = Some(reason);
            svc.updated_at = Some(Utc::now());
            let app = current.apps.entry(app_id.0).or_insert_with(|| App {
                app_id,
                app_name: target_app.app_name.clone(),
                services: Vec::new(),
            });
            app.services.push(svc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::{AppId, RestartPolicy, Service, ServiceId};
    use fleet_runtime::MockRuntimeAdapter;
    use fleet_store::InMemoryStore;
    use std::collections::HashMap;

    fn config(image: &str) -> ServiceConfig {
        ServiceConfig {
            image: image.into(),
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::Always,
            labels: HashMap::new(),
            network_mode: None,
        }
    }

    fn one_service_target(image: &str) -> StateSnapshot {
        let svc = Service::desired(AppId(1), ServiceId(1), "web", image, config(image));
        let mut target = StateSnapshot::empty();
        target.apps.insert(
            1,
            App { app_id: AppId(1), app_name: "myapp".into(), services: vec![svc] },
        );
        target
    }

    fn engine() -> Arc<ReconcileEngine> {
        ReconcileEngine::new(Arc::new(InMemoryStore::new()), Arc::new(MockRuntimeAdapter::new()))
    }

    #[tokio::test]
    async fn set_target_rejects_invalid_snapshot() {
        let engine = engine();
        let mut bad = StateSnapshot::empty();
        bad.apps.insert(1, App { app_id: AppId(1), app_name: "Not Valid!".into(), services: vec![] });

        let err = engine.set_target(bad).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidTarget(_)));
    }

    #[tokio::test]
    async fn reconcile_on_empty_target_is_completed_with_zero_steps() {
        let engine = engine();
        let outcome = engine.reconcile().await.unwrap();
        match outcome {
            PlanOutcome::Completed(summary) => {
                assert_eq!(summary.steps_total, 0);
                assert_eq!(summary.steps_applied, 0);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reconcile_brings_up_target_and_persists_current() {
        let engine = engine();
        engine.set_target(one_service_target("nginx:alpine")).await.unwrap();

        let outcome = engine.reconcile().await.unwrap();
        assert!(matches!(outcome, PlanOutcome::Completed(_)));

        let current = engine.get_current().await.unwrap();
        let svc = current.app(AppId(1)).unwrap().service(ServiceId(1)).unwrap();
        assert_eq!(svc.status, Some(ServiceStatus::Running));
        assert!(svc.container_id.is_some());
    }

    #[tokio::test]
    async fn second_reconcile_is_idempotent() {
        let engine = engine();
        engine.set_target(one_service_target("nginx:alpine")).await.unwrap();
        engine.reconcile().await.unwrap();

        let outcome = engine.reconcile().await.unwrap();
        match outcome {
            PlanOutcome::Completed(summary) => assert_eq!(summary.steps_total, 0),
            other => panic!("expected no-op Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_reconcile_returns_already_running() {
        let engine = engine();
        engine.set_target(one_service_target("nginx:alpine")).await.unwrap();

        let guard = engine.reconciling.try_lock().unwrap();
        let outcome = engine.reconcile().await.unwrap();
        assert!(matches!(outcome, PlanOutcome::AlreadyRunning));
        drop(guard);
    }

    #[tokio::test]
    async fn shutdown_cancels_before_next_step() {
        let engine = engine();
        let mut target = StateSnapshot::empty();
        let svc_a = Service::desired(AppId(1), ServiceId(1), "a", "x:1", config("x:1"));
        let svc_b = Service::desired(AppId(2), ServiceId(1), "b", "x:1", config("x:1"));
        target.apps.insert(1, App { app_id: AppId(1), app_name: "a".into(), services: vec![svc_a] });
        target.apps.insert(2, App { app_id: AppId(2), app_name: "b".into(), services: vec![svc_b] });
        engine.set_target(target).await.unwrap();

        engine.request_shutdown();
        let outcome = engine.reconcile().await.unwrap();
        assert!(matches!(outcome, PlanOutcome::Cancelled(_)));
    }
}
