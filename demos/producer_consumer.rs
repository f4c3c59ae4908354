//! Producers, a worker pool and consumers sharing one valve
//!
//! Producers add timestamped tasks with a per-call timeout, workers batch them,
//! consumers simulate slow IO and log the lag after every batch. The first
//! failing task (a producer that cannot enqueue, say) stops everything.
//!
//! Usage: RUST_LOG=info cargo run --example producer_consumer --release

use log::{error, info};
use std::thread;
use std::time::{Duration, Instant};
use valve::{CancelToken, Result, TaskGroup, Valve, ValveBuilder, ValveError};

const PRODUCERS: usize = 5;
const WORKERS: usize = 5;
const CONSUMERS: usize = 3;

/// A unit of work carrying its creation time
#[derive(Debug)]
struct Task {
    created: Instant,
}

fn producer(
    valve: Valve<Task>,
    token: CancelToken,
    every: Duration,
    timeout: Duration,
) -> Result<()> {
    let ticker = crossbeam::channel::tick(every);
    let done = token.done();
    loop {
        crossbeam::select! {
            recv(done) -> _ => return Err(ValveError::Cancelled),
            recv(ticker) -> _ => {
                let call = token.child_with_timeout(timeout);
                valve.add(&call, Task { created: Instant::now() })?;
            }
        }
    }
}

fn consumer(valve: Valve<Task>, token: CancelToken, io_time: Duration) -> Result<()> {
    let batches = valve.receive();
    let done = token.done();
    loop {
        crossbeam::select! {
            recv(done) -> _ => return Err(ValveError::Cancelled),
            recv(batches) -> batch => {
                let batch = batch.map_err(|e| ValveError::Thread(e.to_string()))?;
                valve.done_in_counter();
                let oldest = batch
                    .iter()
                    .map(|t| t.created.elapsed())
                    .max()
                    .unwrap_or_default();
                info!("Batch of {} tasks, oldest {:?}", batch.len(), oldest);
                // mock IO
                thread::sleep(io_time);
            }
        }
        info!("Lag {}", valve.lag());
    }
}

fn main() {
    env_logger::init();

    let valve = match ValveBuilder::new()
        .tick_interval(Duration::from_millis(100))
        .batch_size(100)
        .input_capacity(100)
        .output_capacity(2)
        .build::<Task>()
    {
        Ok(valve) => valve,
        Err(e) => {
            error!("Failed to build valve: {}", e);
            return;
        }
    };

    let root = CancelToken::with_timeout(Duration::from_secs(10));
    let mut group = TaskGroup::new(&root);

    for i in 0..PRODUCERS {
        let valve = valve.clone();
        if let Err(e) = group.spawn(format!("producer-{i}"), move |token| {
            producer(valve, token, Duration::from_millis(1), Duration::from_millis(10))
        }) {
            error!("Failed to spawn producer: {}", e);
            group.cancel();
        }
    }

    for i in 0..WORKERS {
        let valve = valve.clone();
        if let Err(e) = group.spawn(format!("worker-{i}"), move |token| valve.start(&token)) {
            error!("Failed to spawn worker: {}", e);
            group.cancel();
        }
    }

    for i in 0..CONSUMERS {
        let valve = valve.clone();
        if let Err(e) = group.spawn(format!("consumer-{i}"), move |token| {
            consumer(valve, token, Duration::from_millis(100))
        }) {
            error!("Failed to spawn consumer: {}", e);
            group.cancel();
        }
    }

    let result = group.wait();
    println!("{}", valve.metrics().snapshot().format());
    match result {
        Err(e) if e.is_cancellation() => info!("Stopped: {}", e),
        Err(e) => error!("Stopped with error: {}", e),
        Ok(()) => info!("All tasks finished"),
    }
}
