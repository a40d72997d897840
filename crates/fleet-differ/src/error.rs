use thiserror::Error;

/// The differ is a pure function over well-formed input and cannot fail on
/// any state that has passed `fleet_domain::validate_snapshot`. This error
/// exists only to catch a caller skipping validation.
#[derive(Debug, Error)]
pub enum DifferError {
    #[error("app key {key} in StateSnapshot.apps does not match its App.app_id {app_id}")]
    AppKeyMismatch { key: i64, app_id: i64 },
}
