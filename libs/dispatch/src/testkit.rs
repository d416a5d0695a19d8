//! In-memory delivery double for pipeline tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::BatchEnvelope;
use reqwest::StatusCode;

use crate::delivery::{DeliveryClient, DeliveryReceipt};
use crate::error::DeliveryError;

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Accept,
    /// Fails with `Remote { status }`.
    Reject(u16),
    Timeout,
}

#[derive(Default)]
struct Inner {
    script: VecDeque<Outcome>,
    sent: Vec<BatchEnvelope>,
}

/// Records every envelope and answers from a script; accepts once the script
/// runs out. An optional delay simulates a slow sink.
#[derive(Clone, Default)]
pub struct ScriptedDelivery {
    inner: Arc<Mutex<Inner>>,
    delay: Option<Duration>,
}

impl ScriptedDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let delivery = Self::default();
        delivery.push(outcomes);
        delivery
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, outcomes: impl IntoIterator<Item = Outcome>) {
        self.lock().script.extend(outcomes);
    }

    /// Every envelope received so far, failed attempts included.
    pub fn sent(&self) -> Vec<BatchEnvelope> {
        self.lock().sent.clone()
    }

    pub fn attempts(&self) -> usize {
        self.lock().sent.len()
    }

    /// Message ids of each attempt, in order.
    pub fn sent_ids(&self) -> Vec<Vec<String>> {
        self.lock()
            .sent
            .iter()
            .map(|env| env.events.iter().map(|e| e.msg_id().to_string()).collect())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DeliveryClient for ScriptedDelivery {
    async fn send(&self, envelope: &BatchEnvelope) -> Result<DeliveryReceipt, DeliveryError> {
        let outcome = {
            let mut inner = self.lock();
            inner.sent.push(envelope.clone());
            inner.script.pop_front().unwrap_or(Outcome::Accept)
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match outcome {
            Outcome::Accept => Ok(DeliveryReceipt {
                status: 200,
                stored: Some(envelope.len() as u64),
            }),
            Outcome::Reject(code) => Err(DeliveryError::Remote {
                status: StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_GATEWAY),
                body: String::new(),
            }),
            Outcome::Timeout => Err(DeliveryError::Timeout(Duration::from_secs(10))),
        }
    }
}
