use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container daemon unreachable: {0}")]
    Unreachable(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("a resource named '{0}' already exists")]
    Conflict(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("registry authentication required for image: {0}")]
    AuthRequired(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("internal runtime adapter error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Transient failures are retried by the owning reconcile loop with no
    /// change to the affected service's status; permanent failures mark the
    /// service `failed` in Current (§7).
    pub fn is_transient(&self) -> bool {
        matches!(self, RuntimeError::Unreachable(_) | RuntimeError::Timeout(_) | RuntimeError::Transport(_))
    }
}
