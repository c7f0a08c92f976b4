use anyhow::Error as AnyError;
use serde_json::json;
use thiserror::Error;

use crate::http::{Response, StatusCode};
use crate::response::{IntoResponse, Json};

/// Error message reported to clients when the backend origin cannot be reached.
pub const BACKEND_FAILURE: &str = "Backend connection failed";

/// Request-level error that carries an HTTP status code.
#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("{message}")]
    BadRequest { message: String },
    #[error("no route matched path: {path}")]
    NotFound { path: String },
    #[error("backend {backend} unreachable: {message}")]
    BadGateway { message: String, backend: String },
    #[error("internal error: {source}")]
    Internal {
        #[from]
        source: AnyError,
    },
}

impl EdgeError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        EdgeError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        EdgeError::NotFound { path: path.into() }
    }

    /// A transport-level failure talking to `backend`.
    pub fn bad_gateway(message: impl Into<String>, backend: impl Into<String>) -> Self {
        EdgeError::BadGateway {
            message: message.into(),
            backend: backend.into(),
        }
    }

    pub fn internal<E>(error: E) -> Self
    where
        E: Into<AnyError>,
    {
        EdgeError::Internal {
            source: error.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EdgeError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            EdgeError::NotFound { .. } => StatusCode::NOT_FOUND,
            EdgeError::BadGateway { .. } => StatusCode::BAD_GATEWAY,
            EdgeError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            EdgeError::BadRequest { message } => message.clone(),
            EdgeError::NotFound { path } => format!("no route matched path: {path}"),
            EdgeError::BadGateway { message, .. } => message.clone(),
            EdgeError::Internal { source } => format!("internal error: {}", source),
        }
    }
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = match &self {
            EdgeError::BadGateway { message, backend } => json!({
                "error": BACKEND_FAILURE,
                "message": message,
                "backend": backend,
            }),
            _ => json!({
                "error": {
                    "status": status.as_u16(),
                    "message": self.message(),
                }
            }),
        };
        (status, Json(payload)).into_response()
    }
}
