use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleet_domain::{DeviceIdentity, StateSnapshot};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::state::{HistoryRecord, SnapshotKind, HISTORY_RETENTION};
use crate::store::StateStore;

const DEVICE: TableDefinition<&str, &[u8]> = TableDefinition::new("device");
const STATE_SNAPSHOT: TableDefinition<&str, &[u8]> = TableDefinition::new("state_snapshot");
const HISTORY: TableDefinition<u64, &[u8]> = TableDefinition::new("history");
const DEVICE_CONFIG: TableDefinition<&str, &[u8]> = TableDefinition::new("device_config");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SCHEMA_VERSION: u32 = 1;
const IDENTITY_KEY: &str = "identity";

fn internal<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Internal(e.to_string())
}

/// Persistent state store backed by a single-file redb database. redb's
/// single-writer, multiple-reader transaction model gives the linearisable
/// writes and crash-consistent reads §4.1 requires without any extra
/// coordination in this layer.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Opens (or creates) a redb database at `path`, running schema checks.
    ///
    /// Returns [`StoreError::SchemaMismatch`] if the database was written by
    /// a newer binary than this one.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(internal)?;
        }
        let db = Database::create(path).map_err(internal)?;

        {
            let wtxn = db.begin_write().map_err(internal)?;
            wtxn.open_table(DEVICE).map_err(internal)?;
            wtxn.open_table(STATE_SNAPSHOT).map_err(internal)?;
            wtxn.open_table(HISTORY).map_err(internal)?;
            wtxn.open_table(DEVICE_CONFIG).map_err(internal)?;
            {
                let mut meta = wtxn.open_table(META).map_err(internal)?;
                let found = meta.get("schema_version").map_err(internal)?.map(|g| g.value());
                match found {
                    None => {
                        meta.insert("schema_version", SCHEMA_VERSION as u64).map_err(internal)?;
                    }
                    Some(found) if found as u32 > SCHEMA_VERSION => {
                        return Err(StoreError::SchemaMismatch {
                            found: found as u32,
                            expected: SCHEMA_VERSION,
                        });
                    }
                    Some(_) => {}
                }
            }
            wtxn.commit().map_err(internal)?;
        }

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl StateStore for RedbStore {
    async fn get_identity(&self) -> Result<Option<DeviceIdentity>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(DEVICE).map_err(internal)?;
        match table.get(IDENTITY_KEY).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn set_identity(&self, identity: &DeviceIdentity) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(identity)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(DEVICE).map_err(internal)?;
            table.insert(IDENTITY_KEY, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn load_target(&self) -> Result<StateSnapshot, StoreError> {
        self.load_snapshot(SnapshotKind::Target).await
    }

    async fn save_target(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(snapshot)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(STATE_SNAPSHOT).map_err(internal)?;
            table
                .insert(SnapshotKind::Target.as_str(), bytes.as_slice())
                .map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn load_current(&self) -> Result<StateSnapshot, StoreError> {
        self.load_snapshot(SnapshotKind::Current).await
    }

    async fn save_current(&self, snapshot: &StateSnapshot) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(snapshot)?;
        let record = HistoryRecord {
            kind: SnapshotKind::Current,
            body: snapshot.clone(),
            created_at: Utc::now(),
        };
        let record_bytes = serde_json::to_vec(&record)?;

        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut snap_table = wtxn.open_table(STATE_SNAPSHOT).map_err(internal)?;
            snap_table
                .insert(SnapshotKind::Current.as_str(), bytes.as_slice())
                .map_err(internal)?;
        }
        {
            let mut meta = wtxn.open_table(META).map_err(internal)?;
            let seq = meta.get("history_seq").map_err(internal)?.map(|g| g.value()).unwrap_or(0);
            let new_seq = seq + 1;
            meta.insert("history_seq", new_seq).map_err(internal)?;

            let mut history = wtxn.open_table(HISTORY).map_err(internal)?;
            history.insert(new_seq, record_bytes.as_slice()).map_err(internal)?;

            if new_seq > HISTORY_RETENTION as u64 {
                let cutoff = new_seq - HISTORY_RETENTION as u64;
                let stale: Vec<u64> = history
                    .range(..=cutoff)
                    .map_err(internal)?
                    .filter_map(|entry| entry.ok().map(|(k, _)| k.value()))
                    .collect();
                for key in stale {
                    history.remove(key).map_err(internal)?;
                }
            }
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn load_device_config(&self, protocol: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(DEVICE_CONFIG).map_err(internal)?;
        match table.get(protocol).map_err(internal)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn save_device_config(&self, protocol: &str, config: &serde_json::Value) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(config)?;
        let wtxn = self.db.begin_write().map_err(internal)?;
        {
            let mut table = wtxn.open_table(DEVICE_CONFIG).map_err(internal)?;
            table.insert(protocol, bytes.as_slice()).map_err(internal)?;
        }
        wtxn.commit().map_err(internal)?;
        Ok(())
    }

    async fn history(&self, limit: u32) -> Result<Vec<HistoryRecord>, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(HISTORY).map_err(internal)?;
        let mut all = Vec::new();
        for entry in table.iter().map_err(internal)? {
            let (_k, v) = entry.map_err(internal)?;
            all.push(serde_json::from_slice::<HistoryRecord>(v.value())?);
        }
        let start = all.len().saturating_sub(limit as usize);
        Ok(all[start..].to_vec())
    }
}

impl RedbStore {
    async fn load_snapshot(&self, kind: SnapshotKind) -> Result<StateSnapshot, StoreError> {
        let rtxn = self.db.begin_read().map_err(internal)?;
        let table = rtxn.open_table(STATE_SNAPSHOT).map_err(internal)?;
        match table.get(kind.as_str()).map_err(internal)? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(StateSnapshot::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::{App, AppId, RestartPolicy, Service, ServiceConfig, ServiceId};
    use std::collections::{BTreeSet, HashMap};
    use tempfile::TempDir;

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

    fn open_store(dir: &TempDir) -> RedbStore {
        RedbStore::open(&dir.path().join("state.redb")).unwrap()
    }

    #[tokio::test]
    async fn load_target_defaults_to_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert!(store.load_target().await.unwrap().apps.is_empty());
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");

        {
            let store = RedbStore::open(&path).unwrap();
            store.save_target(&snapshot_with_app(1)).await.unwrap();
            store.save_current(&snapshot_with_app(1)).await.unwrap();
        }
        {
            let store = RedbStore::open(&path).unwrap();
            assert_eq!(store.load_target().await.unwrap(), snapshot_with_app(1));
            assert_eq!(store.load_current().await.unwrap(), snapshot_with_app(1));
        }
    }

    #[tokio::test]
    async fn identity_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        let identity = DeviceIdentity::unprovisioned("dev1", "generic-x86", "https://cloud.example.com");
        {
            let store = RedbStore::open(&path).unwrap();
            store.set_identity(&identity).await.unwrap();
        }
        {
            let store = RedbStore::open(&path).unwrap();
            assert_eq!(store.get_identity().await.unwrap(), Some(identity));
        }
    }

    #[tokio::test]
    async fn save_current_appends_bounded_history() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        for i in 0..(HISTORY_RETENTION + 5) {
            store.save_current(&snapshot_with_app(i as i64)).await.unwrap();
        }
        let hist = store.history(1000).await.unwrap();
        assert_eq!(hist.len(), HISTORY_RETENTION);
    }

    #[tokio::test]
    async fn schema_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        {
            let db = Database::create(&path).unwrap();
            let wtxn = db.begin_write().unwrap();
            {
                let mut meta = wtxn.open_table(META).unwrap();
                meta.insert("schema_version", (SCHEMA_VERSION + 1) as u64).unwrap();
            }
            wtxn.commit().unwrap();
        }
        let result = RedbStore::open(&path);
        assert!(matches!(result, Err(StoreError::SchemaMismatch { .. })));
    }

    #[tokio::test]
    async fn device_config_persists() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let cfg = serde_json::json!({"ssid": "home"});
        store.save_device_config("wifi", &cfg).await.unwrap();
        assert_eq!(store.load_device_config("wifi").await.unwrap(), Some(cfg));
    }
}
