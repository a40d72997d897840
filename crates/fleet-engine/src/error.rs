use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("target rejected: {0}")]
    InvalidTarget(#[from] fleet_domain::DomainError),

    #[error("store error: {0}")]
    Store(#[from] fleet_store::StoreError),

    #[error("runtime adapter error: {0}")]
    Runtime(#[from] fleet_runtime::RuntimeError),

    #[error("a reconciliation is already running")]
    AlreadyRunning,

    #[error("internal engine error: {0}")]
    Internal(String),
}
