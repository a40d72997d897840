use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected response {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("device registration rejected: {0}")]
    RegistrationRejected(String),

    #[error("device is not provisioned")]
    NotProvisioned,

    #[error("config error: {0}")]
    Config(#[from] fleet_config::ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] fleet_engine::EngineError),

    #[error("store error: {0}")]
    Store(#[from] fleet_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// 4xx other than 408/429 is a client-side defect, not retried (§4.5).
    /// Everything else (connection failures, 5xx, 408/429) is retried with
    /// backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) | ClientError::Timeout => true,
            ClientError::Unexpected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ClientError::RegistrationRejected(_) | ClientError::NotProvisioned => false,
            ClientError::Config(_)
            | ClientError::Engine(_)
            | ClientError::Store(_)
            | ClientError::Serialization(_) => false,
        }
    }
}
