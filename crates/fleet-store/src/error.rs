use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database schema mismatch: found version {found}, this binary supports up to {expected}")]
    SchemaMismatch { found: u32, expected: u32 },

    #[error("internal store error: {0}")]
    Internal(String),
}
