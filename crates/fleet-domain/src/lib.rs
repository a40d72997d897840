pub mod error;
pub mod hash;
pub mod types;
pub mod validate;

pub use error::DomainError;
pub use hash::{compute_desired_hash, sort_json_keys};
pub use types::*;
pub use validate::validate_snapshot;
