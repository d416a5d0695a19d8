use std::sync::Arc;
use std::time::Duration;

use bridge_core::CanonicalEvent;
use bridge_telemetry::recorders;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use crate::buffer::{
    Admission, BufferState, DispatchBuffer, DispatchSettings, FlushReport, FlushTrigger,
    PendingBatch,
};
use crate::delivery::{DeliveryClient, DeliveryReceipt};
use crate::error::DeliveryError;

type Attempt = (PendingBatch, Result<DeliveryReceipt, DeliveryError>, Duration);

/// Drives a [`DispatchBuffer`] against a [`DeliveryClient`], keeping at most
/// one send in flight.
///
/// The in-flight send is stored on the dispatcher, so awaiting
/// [`Dispatcher::wait_in_flight`] inside `tokio::select!` is cancel-safe:
/// dropping that future leaves the attempt running for the next call.
pub struct Dispatcher {
    buffer: DispatchBuffer,
    client: Arc<dyn DeliveryClient>,
    in_flight: Option<BoxFuture<'static, Attempt>>,
}

impl Dispatcher {
    pub fn new(settings: DispatchSettings, client: Arc<dyn DeliveryClient>) -> Self {
        Self {
            buffer: DispatchBuffer::new(settings),
            client,
            in_flight: None,
        }
    }

    pub fn buffer(&self) -> &DispatchBuffer {
        &self.buffer
    }

    pub fn state(&self) -> BufferState {
        self.buffer.state()
    }

    pub fn is_flushing(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.buffer.deadline()
    }

    /// False while a `Block` overflow policy is holding intake back.
    pub fn accepting(&self) -> bool {
        !self.buffer.blocks_intake()
    }

    pub fn enqueue(&mut self, event: CanonicalEvent) -> Admission {
        let admission = self.buffer.enqueue(event, Instant::now());
        match admission {
            Admission::Accepted => recorders::record_enqueued(1),
            Admission::EvictedOldest => {
                recorders::record_enqueued(1);
                recorders::record_evicted("overflow", 1);
                warn!(
                    capacity = ?self.buffer.settings().capacity,
                    "buffer full, dropped oldest event"
                );
            }
            Admission::Rejected => {
                recorders::record_evicted("overflow", 1);
                warn!(
                    capacity = ?self.buffer.settings().capacity,
                    "buffer full, dropped incoming event"
                );
            }
        }
        recorders::record_buffer_depth(self.buffer.len());
        admission
    }

    /// Starts a flush if a size or timer trigger is due. Returns whether a
    /// send was started.
    pub fn poll_due(&mut self) -> bool {
        match self.buffer.due_trigger(Instant::now()) {
            Some(trigger) => self.start_flush(trigger),
            None => false,
        }
    }

    /// Snapshots the buffer and launches the send. No-op when empty or when
    /// a send is already in flight.
    pub fn start_flush(&mut self, trigger: FlushTrigger) -> bool {
        if self.in_flight.is_some() {
            return false;
        }
        let Some(batch) = self.buffer.begin_flush(trigger) else {
            return false;
        };
        recorders::record_buffer_depth(self.buffer.len());
        let span = recorders::start_flush_span(
            &batch.envelope().bridge_id,
            trigger.as_str(),
            batch.len(),
        );
        let client = Arc::clone(&self.client);
        let attempt = async move {
            let started = Instant::now();
            let result = client.send(batch.envelope()).await;
            (batch, result, started.elapsed())
        };
        self.in_flight = Some(attempt.instrument(span).boxed());
        true
    }

    /// Awaits the in-flight send, if any, and settles it with the buffer.
    pub async fn wait_in_flight(&mut self) -> Option<FlushReport> {
        let attempt = self.in_flight.as_mut()?;
        let (batch, result, elapsed) = attempt.await;
        self.in_flight = None;
        Some(self.settle(batch, result, elapsed))
    }

    /// Waits out any in-flight send, then flushes whatever is queued and
    /// waits for that attempt too.
    pub async fn flush(&mut self, trigger: FlushTrigger) -> Option<FlushReport> {
        self.wait_in_flight().await;
        if !self.start_flush(trigger) {
            return None;
        }
        self.wait_in_flight().await
    }

    /// Final best-effort delivery before exit. Whatever the last attempt
    /// fails to deliver is discarded.
    pub async fn drain_on_shutdown(&mut self) -> Option<FlushReport> {
        let pending = self.wait_in_flight().await;
        let report = match self.flush(FlushTrigger::Shutdown).await {
            Some(report) => Some(report),
            None => pending,
        };
        if !self.buffer.is_empty() {
            warn!(
                undelivered = self.buffer.len(),
                "shutting down with undelivered events"
            );
        }
        report
    }

    fn settle(
        &mut self,
        batch: PendingBatch,
        result: Result<DeliveryReceipt, DeliveryError>,
        elapsed: Duration,
    ) -> FlushReport {
        let count = batch.len();
        let trigger = batch.trigger();
        let latency = elapsed.as_secs_f64();
        match &result {
            Ok(receipt) => {
                recorders::record_delivery_success(count, latency);
                info!(
                    count,
                    trigger = trigger.as_str(),
                    status = receipt.status,
                    stored = ?receipt.stored,
                    "posted batch"
                );
            }
            Err(err) => {
                recorders::record_delivery_failure(err.kind(), latency);
                warn!(
                    count,
                    trigger = trigger.as_str(),
                    kind = err.kind(),
                    error = %err,
                    "batch delivery failed, events requeued"
                );
            }
        }

        let report = self
            .buffer
            .finish_flush(batch, result.is_ok(), Instant::now());
        if let FlushReport::Failed {
            exhausted, evicted, ..
        } = report
        {
            if exhausted > 0 {
                recorders::record_evicted("retry_exhausted", exhausted);
                warn!(
                    dropped = exhausted,
                    max_attempts = ?self.buffer.settings().max_attempts,
                    "dropping events after repeated delivery failures"
                );
            }
            if evicted > 0 {
                recorders::record_evicted("overflow", evicted);
                warn!(dropped = evicted, "buffer full after requeue, dropped events");
            }
        }
        recorders::record_buffer_depth(self.buffer.len());
        debug!(depth = self.buffer.len(), state = ?self.buffer.state(), "flush settled");
        report
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("buffer", &self.buffer)
            .field("in_flight", &self.in_flight.is_some())
            .finish()
    }
}
