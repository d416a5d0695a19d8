//! Buffering and signed delivery of canonical event batches.
//!
//! [`DispatchBuffer`] is the pure scheduling state machine, [`Dispatcher`]
//! couples it to a [`DeliveryClient`], and [`HttpDeliveryClient`] posts
//! batches to the ingest sink.

pub mod buffer;
pub mod delivery;
pub mod dispatcher;
pub mod error;
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use buffer::{
    Admission, BufferState, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DispatchBuffer,
    DispatchSettings, FlushReport, FlushTimerMode, FlushTrigger, OverflowPolicy, PendingBatch,
};
pub use delivery::{
    DEFAULT_TIMEOUT, DEFAULT_TOKEN_TTL, DeliveryClient, DeliveryReceipt, HttpDeliveryClient,
};
pub use dispatcher::Dispatcher;
pub use error::DeliveryError;
