use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A simple percentile tracker that maintains a sliding window of measurements
#[derive(Debug, Clone)]
pub struct PercentileTracker {
    measurements: Arc<Mutex<VecDeque<u64>>>,
    window_size: usize,
}

impl PercentileTracker {
    /// Create a new percentile tracker with a specified window size
    pub fn new(window_size: usize) -> Self {
        Self {
            measurements: Arc::new(Mutex::new(VecDeque::with_capacity(window_size))),
            window_size,
        }
    }

    /// Record a measurement (in nanoseconds)
    pub fn record(&self, nanos: u64) {
        let mut measurements = self.measurements.lock();
        if measurements.len() >= self.window_size {
            measurements.pop_front();
        }
        measurements.push_back(nanos);
    }

    /// Calculate the p50 (median) in microseconds
    pub fn p50_us(&self) -> f64 {
        self.percentile(0.50)
    }

    /// Calculate the p99 in microseconds
    pub fn p99_us(&self) -> f64 {
        self.percentile(0.99)
    }

    fn percentile(&self, p: f64) -> f64 {
        let measurements = self.measurements.lock();
        if measurements.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<_> = measurements.iter().copied().collect();
        sorted.sort_unstable();

        let idx = ((sorted.len() as f64 * p).ceil() as usize).saturating_sub(1);
        sorted[idx] as f64 / 1000.0
    }

    /// Get the count of recorded measurements
    pub fn count(&self) -> usize {
        self.measurements.lock().len()
    }
}

/// Why a batch was offered to the output queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The periodic tick fired with a non-empty batch
    Tick,
    /// The batch reached `batch_size`
    Size,
}

/// Valve-wide counters shared by every producer and worker
///
/// Unlike the pending counters these only ever grow.
#[derive(Debug, Clone)]
pub struct ValveMetrics {
    items_accepted: Arc<AtomicU64>,
    adds_rejected: Arc<AtomicU64>,
    tick_flushes: Arc<AtomicU64>,
    size_flushes: Arc<AtomicU64>,
    items_flushed: Arc<AtomicU64>,
    deferred_flushes: Arc<AtomicU64>,
    items_discarded: Arc<AtomicU64>,
    /// Time from the first item entering a batch to that batch being flushed
    batch_age: PercentileTracker,
    start_time: Instant,
}

impl ValveMetrics {
    pub fn new() -> Self {
        Self {
            items_accepted: Arc::new(AtomicU64::new(0)),
            adds_rejected: Arc::new(AtomicU64::new(0)),
            tick_flushes: Arc::new(AtomicU64::new(0)),
            size_flushes: Arc::new(AtomicU64::new(0)),
            items_flushed: Arc::new(AtomicU64::new(0)),
            deferred_flushes: Arc::new(AtomicU64::new(0)),
            items_discarded: Arc::new(AtomicU64::new(0)),
            batch_age: PercentileTracker::new(1000),
            start_time: Instant::now(),
        }
    }

    pub(crate) fn record_accepted(&self) {
        self.items_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.adds_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, reason: FlushReason, items: usize, age: Duration) {
        match reason {
            FlushReason::Tick => self.tick_flushes.fetch_add(1, Ordering::Relaxed),
            FlushReason::Size => self.size_flushes.fetch_add(1, Ordering::Relaxed),
        };
        self.items_flushed.fetch_add(items as u64, Ordering::Relaxed);
        self.batch_age.record(age.as_nanos() as u64);
    }

    pub(crate) fn record_deferred(&self) {
        self.deferred_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, items: usize) {
        self.items_discarded.fetch_add(items as u64, Ordering::Relaxed);
    }

    /// Items accepted by `add` or `badd`
    pub fn items_accepted(&self) -> u64 {
        self.items_accepted.load(Ordering::Relaxed)
    }

    /// Non-blocking adds refused because the input queue was full
    pub fn adds_rejected(&self) -> u64 {
        self.adds_rejected.load(Ordering::Relaxed)
    }

    /// Batches pushed after a tick
    pub fn tick_flushes(&self) -> u64 {
        self.tick_flushes.load(Ordering::Relaxed)
    }

    /// Batches pushed after reaching `batch_size`
    pub fn size_flushes(&self) -> u64 {
        self.size_flushes.load(Ordering::Relaxed)
    }

    /// Total batches pushed to the output queue
    pub fn batches_flushed(&self) -> u64 {
        self.tick_flushes() + self.size_flushes()
    }

    /// Total items carried by pushed batches
    pub fn items_flushed(&self) -> u64 {
        self.items_flushed.load(Ordering::Relaxed)
    }

    /// Flush attempts that found the output queue full
    pub fn deferred_flushes(&self) -> u64 {
        self.deferred_flushes.load(Ordering::Relaxed)
    }

    /// Items dropped because their worker was cancelled
    pub fn items_discarded(&self) -> u64 {
        self.items_discarded.load(Ordering::Relaxed)
    }

    /// Calculate flushed items per second since creation
    pub fn throughput_ips(&self) -> f64 {
        let elapsed = self.start_time.elapsed();
        let total = self.items_flushed();
        if elapsed.as_secs_f64() == 0.0 {
            0.0
        } else {
            total as f64 / elapsed.as_secs_f64()
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let batches = self.batches_flushed();
        MetricsSnapshot {
            items_accepted: self.items_accepted(),
            adds_rejected: self.adds_rejected(),
            tick_flushes: self.tick_flushes(),
            size_flushes: self.size_flushes(),
            deferred_flushes: self.deferred_flushes(),
            items_discarded: self.items_discarded(),
            mean_batch_len: if batches == 0 {
                0.0
            } else {
                self.items_flushed() as f64 / batches as f64
            },
            throughput_ips: self.throughput_ips(),
            batch_age_p50_us: self.batch_age.p50_us(),
            batch_age_p99_us: self.batch_age.p99_us(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for ValveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub items_accepted: u64,
    pub adds_rejected: u64,
    pub tick_flushes: u64,
    pub size_flushes: u64,
    pub deferred_flushes: u64,
    pub items_discarded: u64,
    pub mean_batch_len: f64,
    pub throughput_ips: f64,
    pub batch_age_p50_us: f64,
    pub batch_age_p99_us: f64,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "Accepted: {}, Rejected: {}, Flushes: {} tick / {} size, Deferred: {}, \
             Discarded: {}, Mean batch: {:.2}, Throughput: {:.2} items/s, \
             Batch age P50: {:.2}µs, P99: {:.2}µs, Elapsed: {:.2}s",
            self.items_accepted,
            self.adds_rejected,
            self.tick_flushes,
            self.size_flushes,
            self.deferred_flushes,
            self.items_discarded,
            self.mean_batch_len,
            self.throughput_ips,
            self.batch_age_p50_us,
            self.batch_age_p99_us,
            self.elapsed.as_secs_f64()
        )
    }
}
