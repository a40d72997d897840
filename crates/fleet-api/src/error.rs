use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::BAD_REQUEST, message: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: msg.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<fleet_engine::EngineError> for ApiError {
    fn from(e: fleet_engine::EngineError) -> Self {
        match e {
            fleet_engine::EngineError::InvalidTarget(_) => ApiError::bad_request(e.to_string()),
            fleet_engine::EngineError::AlreadyRunning => {
                ApiError { status: StatusCode::CONFLICT, message: e.to_string() }
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<fleet_store::StoreError> for ApiError {
    fn from(e: fleet_store::StoreError) -> Self {
        ApiError::internal(e.to_string())
    }
}
