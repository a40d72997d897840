use async_trait::async_trait;
use fleet_domain::{DeviceIdentity, StateSnapshot};

use crate::error::StoreError;
use crate::state::HistoryRecord;

/// Durable, crash-consistent storage of state snapshots, device identity, and
/// adapter configuration. Writes are linearisable: a successful save is
/// visible to the next load, and a crash mid-write leaves either the
/// pre-write or post-write version visible, never a torn one.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get_identity(&self) -> Result<Option<DeviceIdentity>, StoreError>;

    /// Writes identity then fsyncs before returning.
    async fn set_identity(&self, identity: &DeviceIdentity) -> Result<(), StoreError>;

    /// Empty apps and default config if no target has ever been set.
    async fn load_target(&self) -> Result<StateSnapshot, StoreError>;

    /// Replaces the target atomically. Does not validate — callers validate
    /// via `fleet_domain::validate_snapshot` before calling this.
    async fn save_target(&self, snapshot: &StateSnapshot) -> Result<(), StoreError>;

    async fn load_current(&self) -> Result<StateSnapshot, StoreError>;

    /// Replaces the current pointer and appends a history record.
    async fn save_current(&self, snapshot: &StateSnapshot) -> Result<(), StoreError>;

    /// Opaque mapping used by adapters; never reconciled by the engine.
    async fn load_device_config(&self, protocol: &str) -> Result<Option<serde_json::Value>, StoreError>;

    async fn save_device_config(&self, protocol: &str, config: &serde_json::Value) -> Result<(), StoreError>;

    /// Most recent `limit` history records, newest last.
    async fn history(&self, limit: u32) -> Result<Vec<HistoryRecord>, StoreError>;
}
