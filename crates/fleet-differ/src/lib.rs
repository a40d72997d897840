mod diff;
mod error;
mod plan;

pub use diff::diff;
pub use error::DifferError;
pub use plan::{Plan, Step};
