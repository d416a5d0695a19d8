use axum::response::{IntoResponse, Response};
use axum::{Json, http::StatusCode};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing bearer")]
    MissingBearer,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("bridge {0:?} not allowed")]
    BridgeNotAllowed(String),
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("batch too large: {size} events, limit {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("storage unavailable")]
    Storage(#[source] std::io::Error),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::MissingBearer | IngestError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            IngestError::BridgeNotAllowed(_) => StatusCode::FORBIDDEN,
            IngestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            IngestError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label for the rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            IngestError::MissingBearer | IngestError::InvalidToken(_) => "unauthorized",
            IngestError::BridgeNotAllowed(_) => "forbidden",
            IngestError::BadRequest(_) => "bad_request",
            IngestError::TooLarge { .. } => "too_large",
            IngestError::Storage(_) => "storage",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            detail: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}
