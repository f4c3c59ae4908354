use crate::cancel::CancelToken;
use crate::error::{Result, ValveError};
use crate::metrics::FlushReason;
use crate::valve::{Batch, Valve};
use crossbeam::channel::{self, TrySendError};
use crossbeam::select;
use log::{debug, info, trace, warn};
use std::time::Instant;

/// One instance of the aggregation loop
///
/// Drains the valve's input queue into a private batch and offers that batch
/// to the output queue whenever it reaches `batch_size` or the worker's clock
/// ticks. Several workers may run against the same valve; their batches are
/// never shared.
pub struct AggregatorWorker<T> {
    valve: Valve<T>,
    batch: Batch<T>,
    batch_started: Option<Instant>,
}

impl<T> AggregatorWorker<T> {
    pub fn new(valve: Valve<T>) -> Self {
        let batch = Vec::with_capacity(valve.config().batch_size);
        Self {
            valve,
            batch,
            batch_started: None,
        }
    }

    /// Number of items currently held in the private batch
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Run the loop until `cancel` fires
    ///
    /// Each iteration waits for the first of cancellation, a tick, or an input
    /// item. A full batch stops taking input until it has been flushed, so no
    /// emitted batch ever exceeds `batch_size`.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<()> {
        let batch_size = self.valve.config().batch_size;
        let ticker = self.valve.clock().ticker();
        let done = cancel.done();
        let expired = cancel.expired();
        let items = self.valve.input().clone();
        let no_input = channel::never::<T>();

        info!(
            "Aggregator worker started (batch_size={}, tick={:?})",
            batch_size,
            self.valve.clock().interval()
        );

        loop {
            if let Some(err) = cancel.error() {
                return Err(self.abort(err));
            }

            let input = if self.batch.len() >= batch_size {
                &no_input
            } else {
                &items
            };

            select! {
                recv(done) -> _ => return Err(self.abort(ValveError::Cancelled)),
                recv(expired) -> _ => return Err(self.abort(ValveError::DeadlineExceeded)),
                recv(ticker) -> _ => {
                    if !self.batch.is_empty() {
                        self.flush(FlushReason::Tick);
                    }
                }
                recv(input) -> msg => {
                    // The valve owns a sender, so the input queue never disconnects.
                    if let Ok(item) = msg {
                        if self.batch.is_empty() {
                            self.batch_started = Some(Instant::now());
                        }
                        self.batch.push(item);
                        self.valve.counters().decr_in();
                    }
                }
            }

            if self.batch.len() >= batch_size {
                self.flush(FlushReason::Size);
            }
        }
    }

    /// Offer the batch to the output queue without blocking
    ///
    /// On success the batch is replaced by an empty one; if the queue is full
    /// the batch is kept intact for the next attempt.
    fn flush(&mut self, reason: FlushReason) -> bool {
        let batch = std::mem::take(&mut self.batch);
        let len = batch.len();
        let counters = self.valve.counters();

        counters.incr_out();
        match self.valve.output().try_send(batch) {
            Ok(()) => {
                let age = self
                    .batch_started
                    .take()
                    .map(|started| started.elapsed())
                    .unwrap_or_default();
                self.valve.metrics().record_flush(reason, len, age);
                debug!("Flushed batch of {} items ({:?})", len, reason);
                true
            }
            Err(TrySendError::Full(batch)) | Err(TrySendError::Disconnected(batch)) => {
                counters.decr_out();
                self.batch = batch;
                self.valve.metrics().record_deferred();
                trace!("Output queue full, keeping batch of {} items", len);
                false
            }
        }
    }

    fn abort(&mut self, err: ValveError) -> ValveError {
        if !self.batch.is_empty() {
            warn!(
                "Aggregator worker cancelled, discarding {} unflushed items",
                self.batch.len()
            );
            self.valve.metrics().record_discarded(self.batch.len());
            self.batch.clear();
            self.batch_started = None;
        }
        info!("Aggregator worker stopped: {}", err);
        err
    }
}
