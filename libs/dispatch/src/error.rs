use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Why one delivery attempt failed. Every variant is retryable.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to sign bearer credential")]
    Sign(#[source] anyhow::Error),
    #[error("sink did not answer within {0:?}")]
    Timeout(Duration),
    #[error("sink transport error")]
    Transport(#[source] reqwest::Error),
    #[error("sink returned {status}: {body}")]
    Remote { status: StatusCode, body: String },
}

impl DeliveryError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Sign(_) => "sign",
            DeliveryError::Timeout(_) => "timeout",
            DeliveryError::Transport(_) => "transport",
            DeliveryError::Remote { status, .. } if status.is_server_error() => "remote_5xx",
            DeliveryError::Remote { .. } => "remote_4xx",
        }
    }
}
