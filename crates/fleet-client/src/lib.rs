pub mod backoff;
pub mod client;
pub mod error;
mod http;
pub mod poll;
pub mod registration;
pub mod report;

pub use backoff::Backoff;
pub use client::StateExchangeClient;
pub use error::ClientError;
pub use registration::RegistrationRequest;
