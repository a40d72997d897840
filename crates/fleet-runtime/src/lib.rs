pub mod driver;
pub mod error;
pub mod http;
pub mod mock;

pub use driver::{ManagedContainer, RuntimeAdapter};
pub use error::RuntimeError;
pub use http::HttpRuntimeAdapter;
pub use mock::MockRuntimeAdapter;
