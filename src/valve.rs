use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::ValveConfig;
use crate::counter::{Counters, Lag};
use crate::error::{Result, ValveError};
use crate::metrics::ValveMetrics;
use crate::worker::AggregatorWorker;
use crossbeam::channel::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// An ordered sequence of items produced by one flush
pub type Batch<T> = Vec<T>;

struct Shared<T> {
    config: ValveConfig,
    clock: Clock,
    input_tx: Sender<T>,
    input_rx: Receiver<T>,
    output_tx: Sender<Batch<T>>,
    output_rx: Receiver<Batch<T>>,
    counters: Counters,
    metrics: ValveMetrics,
}

/// A concurrent micro-batching buffer
///
/// Producers feed single items through [`add`](Valve::add) or
/// [`badd`](Valve::badd); one or more aggregator workers started with
/// [`start`](Valve::start) group them into batches of at most `batch_size`
/// items; consumers drain batches from [`receive`](Valve::receive).
///
/// Cloning is cheap and every clone refers to the same queues and counters.
pub struct Valve<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Valve<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Valve<T> {
    /// Create a valve, allocating both queues once
    pub fn new(config: ValveConfig) -> Result<Self> {
        config.validate()?;
        let (input_tx, input_rx) = channel::bounded(config.input_capacity);
        let (output_tx, output_rx) = channel::bounded(config.output_capacity);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                clock: Clock::new(config.tick_interval),
                input_tx,
                input_rx,
                output_tx,
                output_rx,
                counters: Counters::new(),
                metrics: ValveMetrics::new(),
            }),
        })
    }

    /// Enqueue an item without blocking
    ///
    /// Fails with the token's cancellation error if it has fired, or with
    /// [`ValveError::UnableToEnqueue`] if the input queue is full. Nothing is
    /// retried; the caller decides whether to drop, retry or back off.
    pub fn add(&self, cancel: &CancelToken, item: T) -> Result<()> {
        if let Some(err) = cancel.error() {
            return Err(err);
        }
        let shared = &self.shared;
        shared.counters.incr_in();
        match shared.input_tx.try_send(item) {
            Ok(()) => {
                shared.metrics.record_accepted();
                Ok(())
            }
            Err(_) => {
                shared.counters.decr_in();
                shared.metrics.record_rejected();
                Err(ValveError::UnableToEnqueue)
            }
        }
    }

    /// Enqueue an item, blocking until the input queue has room
    ///
    /// There is no way to cancel the wait: if no worker is draining the input
    /// queue this blocks forever. The item counts as pending while it waits.
    pub fn badd(&self, item: T) -> Result<()> {
        let shared = &self.shared;
        shared.counters.incr_in();
        match shared.input_tx.send(item) {
            Ok(()) => {
                shared.metrics.record_accepted();
                Ok(())
            }
            // The valve holds the receiver, so the channel never disconnects.
            Err(_) => {
                shared.counters.decr_in();
                Err(ValveError::UnableToEnqueue)
            }
        }
    }

    /// A shared read handle on the output queue
    ///
    /// Handles may be cloned freely; each batch is delivered to exactly one
    /// receiver. Call [`done_in_counter`](Valve::done_in_counter) once per
    /// batch after processing it.
    pub fn receive(&self) -> Receiver<Batch<T>> {
        self.shared.output_rx.clone()
    }

    /// Run one aggregator worker on the calling thread until `cancel` fires
    ///
    /// Always ends with a cancellation error. Items held in the worker's
    /// private batch at that moment are discarded.
    pub fn start(&self, cancel: &CancelToken) -> Result<()> {
        AggregatorWorker::new(self.clone()).run(cancel)
    }

    /// Items enqueued but not yet taken into a batch
    pub fn get_in_counter(&self) -> i64 {
        self.shared.counters.pending_in()
    }

    /// Batches emitted but not yet acknowledged
    pub fn get_outin_counter(&self) -> i64 {
        self.shared.counters.pending_out()
    }

    /// Acknowledge one received batch
    pub fn done_in_counter(&self) {
        self.shared.counters.decr_out();
    }

    /// Read both pending counters
    pub fn lag(&self) -> Lag {
        self.shared.counters.lag()
    }

    pub fn config(&self) -> &ValveConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> &ValveMetrics {
        &self.shared.metrics
    }

    /// Instantaneous depth of the input queue
    pub fn input_len(&self) -> usize {
        self.shared.input_rx.len()
    }

    /// Instantaneous depth of the output queue
    pub fn output_len(&self) -> usize {
        self.shared.output_rx.len()
    }

    pub(crate) fn clock(&self) -> Clock {
        self.shared.clock
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.shared.counters
    }

    pub(crate) fn input(&self) -> &Receiver<T> {
        &self.shared.input_rx
    }

    pub(crate) fn output(&self) -> &Sender<Batch<T>> {
        &self.shared.output_tx
    }
}

impl<T: Send + 'static> Valve<T> {
    /// Launch `count` aggregator workers, each on its own thread
    pub fn spawn_workers(
        &self,
        count: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<JoinHandle<Result<()>>>> {
        (0..count)
            .map(|idx| {
                let valve = self.clone();
                let cancel = cancel.clone();
                thread::Builder::new()
                    .name(format!("valve-worker-{idx}"))
                    .spawn(move || valve.start(&cancel))
                    .map_err(|e| ValveError::Thread(e.to_string()))
            })
            .collect()
    }
}
