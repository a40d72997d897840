use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("duplicate service id {service_id} in app {app_id}")]
    DuplicateServiceId { app_id: i64, service_id: i64 },

    #[error("target state must not carry a container_id (service {app_id}/{service_id})")]
    ContainerIdInTarget { app_id: i64, service_id: i64 },

    #[error("invalid app name '{0}': must be a DNS-label-safe string")]
    InvalidAppName(String),

    #[error("invalid service name '{0}': must be a DNS-label-safe string")]
    InvalidServiceName(String),

    #[error("invalid port mapping '{0}'")]
    InvalidPortMapping(String),

    #[error("invalid volume mapping '{0}'")]
    InvalidVolumeMapping(String),
}
