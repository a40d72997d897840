use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::error::ClientError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin wrapper over `reqwest::Client` carrying the cloud endpoint and the
/// device's bearer credential. Mirrors the runtime adapter's `url()`/
/// `classify()` shape: one client, a path-join helper, one status classifier.
#[derive(Clone)]
pub struct CloudHttp {
    client: Client,
    api_endpoint: String,
}

impl CloudHttp {
    pub fn new(api_endpoint: impl Into<String>) -> Self {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().expect("reqwest client");
        Self { client, api_endpoint: api_endpoint.into() }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_endpoint.trim_end_matches('/'), path)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn classify(status: StatusCode, body: &str) -> ClientError {
        ClientError::Unexpected { status: status.as_u16(), body: body.to_string() }
    }
}

pub(crate) fn map_transport(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Transport(err.to_string())
    }
}
