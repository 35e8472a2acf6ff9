use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Staging IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Transport Unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Backend rejected upload: {0}")]
    BackendRejected(String),

    #[error("Backend unreachable: {0}")]
    BackendUnreachable(#[from] reqwest::Error),

    #[error("Bad Request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TransportUnavailable(_) => StatusCode::BAD_REQUEST,
            AppError::BackendRejected(_) | AppError::BackendUnreachable(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            AppError::Io(e) => {
                tracing::error!("Staging IO error: {:?}", e);
                "Internal Server Error: could not stage upload".to_string()
            }
            AppError::BackendUnreachable(e) => {
                tracing::error!("Backend request failed: {:?}", e);
                "Upload relay failed: messaging backend unreachable".to_string()
            }
            AppError::BackendRejected(msg) => format!("Upload relay failed: {}", msg),
            AppError::PayloadTooLarge(msg)
            | AppError::TransportUnavailable(msg)
            | AppError::BadRequest(msg) => msg,
        };

        let body = Json(json!({
            "detail": message
        }));

        (status, body).into_response()
    }
}
