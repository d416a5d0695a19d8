use std::time::Duration;

use async_trait::async_trait;
use bridge_core::BatchEnvelope;
use reqwest::Client;
use security::jwt::{IngestClaims, JwtSigner};
use serde::Deserialize;
use tracing::debug;

use crate::error::DeliveryError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(120);
const MAX_ERROR_BODY: usize = 512;

/// What the sink acknowledged for a delivered batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub status: u16,
    /// Events the sink reports as stored, when it says so.
    pub stored: Option<u64>,
}

/// Transmits one whole batch. Implementations never retry; retry policy is
/// owned by the dispatch buffer.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Posts batches as JSON with a freshly minted bearer token per attempt.
#[derive(Clone, Debug)]
pub struct HttpDeliveryClient {
    client: Client,
    url: String,
    signer: JwtSigner,
    token_ttl: Duration,
    timeout: Duration,
}

impl HttpDeliveryClient {
    pub fn new(
        url: impl Into<String>,
        signer: JwtSigner,
        timeout: Duration,
        token_ttl: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeliveryError::Transport)?;
        Ok(Self {
            client,
            url: url.into(),
            signer,
            token_ttl,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn bearer(&self) -> Result<String, DeliveryError> {
        let ttl = time::Duration::try_from(self.token_ttl)
            .map_err(|err| DeliveryError::Sign(err.into()))?;
        self.signer
            .sign(&IngestClaims::bridge(ttl))
            .map_err(DeliveryError::Sign)
    }

    fn map_transport(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Transport(err)
        }
    }
}

#[derive(Deserialize)]
struct SinkAck {
    #[serde(default)]
    stored: Option<u64>,
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<DeliveryReceipt, DeliveryError> {
        let token = self.bearer()?;
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(envelope)
            .send()
            .await
            .map_err(|err| self.map_transport(err))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".into());
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(DeliveryError::Remote { status, body });
        }

        let stored = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice::<SinkAck>(&bytes)
                .ok()
                .and_then(|ack| ack.stored),
            Err(err) => {
                debug!(error = %err, "sink acknowledged but body was unreadable");
                None
            }
        };
        Ok(DeliveryReceipt {
            status: status.as_u16(),
            stored,
        })
    }
}
