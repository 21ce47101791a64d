//! WebServer-specific error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use shared::SharedError;
use supervisor::SupervisorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebServerError {
    #[error("HTTP server startup failed: {0}")]
    ServerStartup(String),

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("Invalid request: {details}")]
    InvalidRequest { details: String },

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl WebServerError {
    pub fn config(details: impl Into<String>) -> Self {
        WebServerError::Config { details: details.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WebServerError::InvalidRequest { .. } | WebServerError::SharedError(_) | WebServerError::JsonError(_) => {
                StatusCode::BAD_REQUEST
            }
            WebServerError::Supervisor(e) => match e {
                SupervisorError::AlreadyRunning { .. } | SupervisorError::ResourceConflict { .. } => {
                    StatusCode::CONFLICT
                }
                SupervisorError::NoFrequencies
                | SupervisorError::InvalidConfig { .. }
                | SupervisorError::SharedError(_) => StatusCode::BAD_REQUEST,
                SupervisorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

pub type WebServerResult<T> = Result<T, WebServerError>;
