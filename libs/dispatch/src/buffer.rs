//! Ordered event buffer with size and time flush triggers.
//!
//! The buffer performs no I/O. [`DispatchBuffer::begin_flush`] hands out a
//! snapshot of everything queued, and [`DispatchBuffer::finish_flush`] either
//! discards it or puts it back at the head of the queue. At most one snapshot
//! is outstanding at a time.

use std::collections::VecDeque;
use std::time::Duration;

use bridge_core::{BatchEnvelope, CanonicalEvent};
use tokio::time::Instant;

pub const DEFAULT_BATCH_SIZE: usize = 200;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1500);

/// How enqueues interact with an already armed flush timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushTimerMode {
    /// Arm once; later enqueues leave the deadline alone.
    #[default]
    Deadline,
    /// Every enqueue pushes the deadline one interval out.
    Debounce,
}

/// What happens when `capacity` queued events are already waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    DropNewest,
    /// Stop taking input until the queue drains below capacity.
    ///
    /// The bound is checked between transport notifications, so the events
    /// of a single notification are all admitted and may push the queue
    /// past `capacity`.
    Block,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub bridge_id: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub timer_mode: FlushTimerMode,
    /// Upper bound on queued (not in-flight) events. `None` is unbounded.
    pub capacity: Option<usize>,
    pub overflow: OverflowPolicy,
    /// Failed attempts after which an event is discarded. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            bridge_id: "wa-bridge".into(),
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            timer_mode: FlushTimerMode::default(),
            capacity: None,
            overflow: OverflowPolicy::default(),
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Idle,
    Accumulating,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Size,
    Timer,
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

/// Result of offering one event to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// Accepted after discarding the oldest queued event.
    EvictedOldest,
    /// Discarded because the queue was full.
    Rejected,
}

#[derive(Debug, Clone)]
struct Queued {
    event: CanonicalEvent,
    failed_attempts: u32,
}

/// A snapshot taken by [`DispatchBuffer::begin_flush`].
#[derive(Debug)]
pub struct PendingBatch {
    envelope: BatchEnvelope,
    failed_attempts: Vec<u32>,
    trigger: FlushTrigger,
}

impl PendingBatch {
    pub fn envelope(&self) -> &BatchEnvelope {
        &self.envelope
    }

    pub fn trigger(&self) -> FlushTrigger {
        self.trigger
    }

    pub fn len(&self) -> usize {
        self.envelope.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.events.is_empty()
    }
}

/// How a flush attempt was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReport {
    Delivered {
        events: usize,
    },
    Failed {
        requeued: usize,
        /// Events discarded because they hit `max_attempts`.
        exhausted: usize,
        /// Events discarded by the overflow policy on reinsertion.
        evicted: usize,
    },
}

#[derive(Debug)]
pub struct DispatchBuffer {
    settings: DispatchSettings,
    queue: VecDeque<Queued>,
    deadline: Option<Instant>,
    size_requested: bool,
    flushing: bool,
}

impl DispatchBuffer {
    pub fn new(settings: DispatchSettings) -> Self {
        Self {
            settings,
            queue: VecDeque::new(),
            deadline: None,
            size_requested: false,
            flushing: false,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn state(&self) -> BufferState {
        if self.flushing {
            BufferState::Flushing
        } else if self.queue.is_empty() {
            BufferState::Idle
        } else {
            BufferState::Accumulating
        }
    }

    /// The single armed flush timer, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// True when `Block` overflow applies and the queue is full.
    pub fn blocks_intake(&self) -> bool {
        matches!(self.settings.overflow, OverflowPolicy::Block)
            && self
                .settings
                .capacity
                .is_some_and(|cap| self.queue.len() >= cap)
    }

    /// Appends `event` and updates flush scheduling.
    ///
    /// Reaching the size threshold requests an immediate flush and disarms
    /// the timer; otherwise the timer is armed according to the timer mode.
    pub fn enqueue(&mut self, event: CanonicalEvent, now: Instant) -> Admission {
        let mut admission = Admission::Accepted;
        if let Some(cap) = self.settings.capacity
            && self.queue.len() >= cap
        {
            match self.settings.overflow {
                OverflowPolicy::DropOldest => {
                    self.queue.pop_front();
                    admission = Admission::EvictedOldest;
                }
                OverflowPolicy::DropNewest => return Admission::Rejected,
                OverflowPolicy::Block => {}
            }
        }
        self.queue.push_back(Queued {
            event,
            failed_attempts: 0,
        });

        if self.queue.len() >= self.settings.batch_size {
            self.size_requested = true;
            self.deadline = None;
        } else {
            self.arm_timer(now);
        }
        admission
    }

    fn arm_timer(&mut self, now: Instant) {
        match self.settings.timer_mode {
            FlushTimerMode::Deadline => {
                if self.deadline.is_none() {
                    self.deadline = Some(now + self.settings.flush_interval);
                }
            }
            FlushTimerMode::Debounce => {
                self.deadline = Some(now + self.settings.flush_interval);
            }
        }
    }

    /// Which trigger, if any, says a flush should start now.
    pub fn due_trigger(&self, now: Instant) -> Option<FlushTrigger> {
        if self.flushing || self.queue.is_empty() {
            return None;
        }
        if self.size_requested {
            return Some(FlushTrigger::Size);
        }
        match self.deadline {
            Some(deadline) if deadline <= now => Some(FlushTrigger::Timer),
            _ => None,
        }
    }

    /// Takes everything queued right now. Returns `None` when empty or when a
    /// snapshot is already outstanding.
    pub fn begin_flush(&mut self, trigger: FlushTrigger) -> Option<PendingBatch> {
        if self.flushing || self.queue.is_empty() {
            return None;
        }
        let (events, failed_attempts): (Vec<_>, Vec<_>) = self
            .queue
            .drain(..)
            .map(|q| (q.event, q.failed_attempts))
            .unzip();
        self.flushing = true;
        self.deadline = None;
        self.size_requested = false;
        Some(PendingBatch {
            envelope: BatchEnvelope::new(self.settings.bridge_id.clone(), events),
            failed_attempts,
            trigger,
        })
    }

    /// Settles the outstanding snapshot.
    ///
    /// On failure the surviving events go back to the head of the queue in
    /// their original order, ahead of anything enqueued meanwhile, and the
    /// timer is armed one interval out. The requeued events alone never
    /// request a size flush; the next enqueue that reaches the threshold does.
    pub fn finish_flush(
        &mut self,
        batch: PendingBatch,
        delivered: bool,
        now: Instant,
    ) -> FlushReport {
        self.flushing = false;
        if delivered {
            let events = batch.len();
            if self.queue.len() >= self.settings.batch_size {
                self.size_requested = true;
                self.deadline = None;
            } else if !self.queue.is_empty() {
                self.arm_timer_if_unset(now);
            }
            return FlushReport::Delivered { events };
        }

        let max_attempts = self.settings.max_attempts;
        let mut exhausted = 0;
        let mut retry = Vec::with_capacity(batch.failed_attempts.len());
        for (event, attempts) in batch
            .envelope
            .events
            .into_iter()
            .zip(batch.failed_attempts)
        {
            let failed_attempts = attempts.saturating_add(1);
            if max_attempts.is_some_and(|max| failed_attempts >= max) {
                exhausted += 1;
                continue;
            }
            retry.push(Queued {
                event,
                failed_attempts,
            });
        }
        let requeued = retry.len();
        for queued in retry.into_iter().rev() {
            self.queue.push_front(queued);
        }
        let evicted = self.enforce_capacity();

        self.size_requested = false;
        if !self.queue.is_empty() {
            self.deadline = Some(now + self.settings.flush_interval);
        }
        FlushReport::Failed {
            requeued,
            exhausted,
            evicted,
        }
    }

    fn arm_timer_if_unset(&mut self, now: Instant) {
        if self.deadline.is_none() {
            self.deadline = Some(now + self.settings.flush_interval);
        }
    }

    fn enforce_capacity(&mut self) -> usize {
        let Some(cap) = self.settings.capacity else {
            return 0;
        };
        let mut evicted = 0;
        while self.queue.len() > cap {
            match self.settings.overflow {
                OverflowPolicy::DropOldest => {
                    self.queue.pop_front();
                }
                OverflowPolicy::DropNewest => {
                    self.queue.pop_back();
                }
                OverflowPolicy::Block => break,
            }
            evicted += 1;
        }
        evicted
    }
}
