use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleet_domain::{DeviceIdentity, StateSnapshot};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::state::{HistoryRecord, SnapshotKind, HISTORY_RETENTION};
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    identity: Option<DeviceIdentity>,
    target: Option<StateSnapshot>,
    current: Option<StateSnapshot>,
    device_config: std::collections::HashMap<String, serde_json::Value>,
    history: Vec<HistoryRecord>,
}

/// In-memory implementation of [`StateStore`]. All data is lost on process
/// exit. Used for tests and the agent's `--ephemeral` mode.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get_identity(&self) -> Result<Option<DeviceIdentity>, StoreError> {
        Ok(self.inner.read().await.identity.clone())
    }

    async fn set_identity(&self, identity: &DeviceIdentity) -> Result<(), StoreError> {
        self.inner.write().await.identity = Some(identity.clone());
        Ok(())
    }

    async fn load_target(&self) -> Result<StateSnapshot, StoreError> {
        Ok(self.inner.read().await.target.clone().unwrap_or_else(StateSnapshot::empty))
    }

    async fn save_target(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        self.inner.write().await.target = Some(snapshot.clone());
        Ok(())
    }

    async fn load_current(&self) -> Result<StateSnapshot, StoreError> {
        Ok(self.inner.read().await.current.clone().unwrap_or_else(StateSnapshot::empty))
    }

    async fn save_current(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.current = Some(snapshot.clone());
        guard.history.push(HistoryRecord {
            kind: SnapshotKind::Current,
            body: snapshot.clone(),
            created_at: Utc::now(),
        });
        let len = guard.history.len();
        if len > HISTORY_RETENTION {
            guard.history.drain(0..len - HISTORY_RETENTION);
        }
        Ok(())
    }

    async fn load_device_config(&self, protocol: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.inner.read().await.device_config.get(protocol).cloned())
    }

    async fn save_device_config(&self, protocol: &str, config: &serde_json::Value) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .device_config
            .insert(protocol.to_string(), config.clone());
        Ok(())
    }

    async fn history(&self, limit: u32) -> Result<Vec<HistoryRecord>, StoreError> {
        let guard = self.inner.read().await;
        let start = guard.history.len().saturating_sub(limit as usize);
        Ok(guard.history[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::{App, AppId, RestartPolicy, Service, ServiceConfig, ServiceId};
    use std::collections::{BTreeSet, HashMap};

    fn snapshot_with_app(app_id: i64) -> StateSnapshot {
        let cfg = ServiceConfig {
            image: "nginx:alpine".into(),
            environment: HashMap::new(),
            ports: vec![],
            volumes: vec![],
            networks: BTreeSet::new(),
            restart_policy: RestartPolicy::Always,
            labels: HashMap::new(),
            network_mode: None,
        };
        let svc = Service::desired(AppId(app_id), ServiceId(1), "web", "nginx:alpine", cfg);
        let mut snap = StateSnapshot::empty();
        snap.apps.insert(
            app_id,
            App { app_id: AppId(app_id), app_name: "myapp".into(), services: vec![svc] },
        );
        snap
    }

    #[tokio::test]
    async fn load_target_defaults_to_empty() {
        let store = InMemoryStore::new();
        let loaded = store.load_target().await.unwrap();
        assert!(loaded.apps.is_empty());
    }

    #[tokio::test]
    async fn save_then_load_target_round_trips() {
        let store = InMemoryStore::new();
        let snap = snapshot_with_app(1);
        store.save_target(&snap).await.unwrap();
        assert_eq!(store.load_target().await.unwrap(), snap);
    }

    #[tokio::test]
    async fn save_current_appends_history() {
        let store = InMemoryStore::new();
        store.save_current(&snapshot_with_app(1)).await.unwrap();
        store.save_current(&snapshot_with_app(2)).await.unwrap();
        let hist = store.history(10).await.unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(store.load_current().await.unwrap(), snapshot_with_app(2));
    }

    #[tokio::test]
    async fn history_bounded_by_retention() {
        let store = InMemoryStore::new();
        for i in 0..(HISTORY_RETENTION + 5) {
            store.save_current(&snapshot_with_app(i as i64)).await.unwrap();
        }
        let hist = store.history(1000).await.unwrap();
        assert_eq!(hist.len(), HISTORY_RETENTION);
    }

    #[tokio::test]
    async fn identity_round_trips() {
        let store = InMemoryStore::new();
        assert!(store.get_identity().await.unwrap().is_none());
        let identity = DeviceIdentity::unprovisioned("dev1", "generic-x86", "https://cloud.example.com");
        store.set_identity(&identity).await.unwrap();
        assert_eq!(store.get_identity().await.unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn device_config_round_trips() {
        let store = InMemoryStore::new();
        assert!(store.load_device_config("wifi").await.unwrap().is_none());
        let cfg = serde_json::json!({"ssid": "home"});
        store.save_device_config("wifi", &cfg).await.unwrap();
        assert_eq!(store.load_device_config("wifi").await.unwrap(), Some(cfg));
    }
}
