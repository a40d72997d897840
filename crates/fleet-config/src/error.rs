use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state document has no entry for device '{uuid}'")]
    MissingDeviceEntry { uuid: String },

    #[error("conversion error in {field}: {message}")]
    Conversion { field: String, message: String },

    #[error("missing or invalid environment variable {name}: {message}")]
    EnvVar { name: String, message: String },

    #[error("domain error: {0}")]
    Domain(#[from] fleet_domain::DomainError),
}
