use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model inference error: {0}")]
    ModelInference(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid URL")]
    InvalidUrl(String),

    #[error("Unable to retrieve PhishTank data.")]
    FeedUnavailable,

    #[error("Error processing PhishTank data")]
    FeedProcessing(String),

    #[error("{0}")]
    MissingConfiguration(String),

    #[error("{0}")]
    Notification(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn details(&self) -> Option<&str> {
        match self {
            AppError::InvalidUrl(details) | AppError::FeedProcessing(details) => Some(details),
            _ => None,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InvalidInput(_) | AppError::InvalidUrl(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::FeedUnavailable => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::FeedProcessing(_)
            | AppError::MissingConfiguration(_)
            | AppError::Notification(_) => {
                tracing::error!("Request failed: {} {:?}", self, self.details());
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            _ => {
                tracing::error!("Internal server error: {}", self);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(details) = self.details() {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}

// Helper function for creating validation errors
pub fn validation_error(msg: &str) -> AppError {
    AppError::InvalidInput(msg.to_string())
}
