//! Single-consumer loop that owns the directory cache and the dispatcher.

use std::future::Future;
use std::sync::Arc;

use bridge_core::{DirectoryCache, normalize_batch};
use bridge_dispatch::{DeliveryClient, DispatchSettings, Dispatcher, FlushReport};
use bridge_telemetry::recorders;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::transport::TransportEvent;

/// Why [`Pipeline::run`] stopped taking input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Signal,
    EndOfInput,
}

#[derive(Debug)]
pub struct Pipeline {
    directory: DirectoryCache,
    dispatcher: Dispatcher,
}

impl Pipeline {
    pub fn new(settings: DispatchSettings, client: Arc<dyn DeliveryClient>) -> Self {
        Self {
            directory: DirectoryCache::new(),
            dispatcher: Dispatcher::new(settings, client),
        }
    }

    pub fn directory(&self) -> &DirectoryCache {
        &self.directory
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Applies one notification. Never blocks.
    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Messages(messages) => {
                let events = normalize_batch(&messages, &self.directory);
                let dropped = messages.len() - events.len();
                recorders::record_normalized(events.len());
                if dropped > 0 {
                    recorders::record_dropped("empty", dropped);
                    debug!(dropped, "skipped messages without text or media");
                }
                for event in events {
                    self.dispatcher.enqueue(event);
                }
            }
            TransportEvent::MessageUpdates(count) => {
                debug!(count, "ignoring message edits and deletions");
            }
            TransportEvent::Chats { chats, .. } => {
                let recorded = self.directory.absorb_chats(&chats);
                recorders::record_roster_update("chats", recorded);
                debug!(recorded, known = self.directory.len_chats(), "chat titles updated");
            }
            TransportEvent::Contacts { contacts, .. } => {
                let recorded = self.directory.absorb_contacts(&contacts);
                recorders::record_roster_update("contacts", recorded);
                debug!(
                    recorded,
                    known = self.directory.len_contacts(),
                    "contact names updated"
                );
            }
            TransportEvent::Connection(update) => {
                info!(
                    connection = update.connection.as_deref().unwrap_or("unknown"),
                    pairing = update.pairing_code.is_some(),
                    "transport connection update"
                );
            }
        }
    }

    /// Consumes notifications until `shutdown` resolves or the channel
    /// closes, then drains the buffer with one final flush attempt.
    pub async fn run<S>(
        &mut self,
        rx: &mut mpsc::Receiver<TransportEvent>,
        shutdown: S,
    ) -> (StopReason, Option<FlushReport>)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let reason = loop {
            self.dispatcher.poll_due();

            let flushing = self.dispatcher.is_flushing();
            let deadline = self.dispatcher.deadline().filter(|_| !flushing);
            let accepting = self.dispatcher.accepting();

            tokio::select! {
                _ = &mut shutdown => break StopReason::Signal,
                _ = self.dispatcher.wait_in_flight(), if flushing => {}
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {}
                next = rx.recv(), if accepting => match next {
                    Some(event) => self.handle(event),
                    None => break StopReason::EndOfInput,
                },
            }
        };

        match reason {
            StopReason::Signal => info!("termination signal received, flushing"),
            StopReason::EndOfInput => info!("transport stream ended, flushing"),
        }
        let report = self.dispatcher.drain_on_shutdown().await;
        (reason, report)
    }
}
