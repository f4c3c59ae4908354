//! A concurrent micro-batching buffer ("valve").
//!
//! A valve sits between any number of producers and consumers. Producers add
//! single items to a bounded input queue; one or more aggregator workers group
//! them into batches that are flushed to a bounded output queue either when
//! they reach `batch_size` or when the worker's periodic tick fires; consumers
//! drain batches and acknowledge them.
//!
//! # Features
//!
//! - Bounded input and output queues built on crossbeam channels
//! - Non-blocking `add` that reports a full queue instead of waiting
//! - Size and tick triggered flushes that never drop a batch on a full output queue
//! - Any number of concurrent aggregator workers
//! - Pending-in / pending-out counters for lag observation
//! - Cooperative cancellation with deadlines, and a task group to run it all
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use valve::{CancelToken, ValveBuilder};
//!
//! let valve = ValveBuilder::new()
//!     .tick_interval(Duration::from_millis(100))
//!     .batch_size(100)
//!     .input_capacity(100)
//!     .output_capacity(2)
//!     .build::<u64>()?;
//!
//! let token = CancelToken::new();
//! let workers = valve.spawn_workers(4, &token)?;
//!
//! valve.add(&token, 42)?;
//! let batch = valve.receive().recv()?;
//! valve.done_in_counter();
//! ```

pub mod cancel;
pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod group;
pub mod metrics;
pub mod valve;
pub mod worker;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use clock::Clock;
pub use config::{ValveBuilder, ValveConfig};
pub use counter::{Counters, Lag};
pub use error::{Result, ValveError};
pub use group::TaskGroup;
pub use metrics::{FlushReason, MetricsSnapshot, ValveMetrics};
pub use valve::{Batch, Valve};
pub use worker::AggregatorWorker;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
