use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use valve::{CancelToken, TaskGroup, Valve, ValveBuilder, ValveError};

fn build(tick: Duration, batch_size: usize, input: usize, output: usize) -> Valve<u32> {
    let _ = env_logger::builder().is_test(true).try_init();
    ValveBuilder::new()
        .tick_interval(tick)
        .batch_size(batch_size)
        .input_capacity(input)
        .output_capacity(output)
        .build()
        .expect("Valve build failed")
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_size_then_tick_flush() {
    let valve = build(Duration::from_secs(1), 3, 10, 10);
    let token = CancelToken::new();
    let start = Instant::now();
    for i in 0..5 {
        valve.add(&token, i).expect("Add failed");
    }
    let workers = valve.spawn_workers(1, &token).expect("Spawn failed");

    let batches = valve.receive();
    let first = batches
        .recv_timeout(Duration::from_millis(900))
        .expect("Size-triggered batch missing");
    assert_eq!(first, vec![0, 1, 2]);
    assert!(start.elapsed() < Duration::from_secs(1));

    let second = batches
        .recv_timeout(Duration::from_secs(3))
        .expect("Tick-triggered batch missing");
    assert_eq!(second, vec![3, 4]);
    assert!(start.elapsed() >= Duration::from_millis(900));

    token.cancel();
    for handle in workers {
        assert_eq!(handle.join().unwrap(), Err(ValveError::Cancelled));
    }
}

#[test]
fn test_full_output_retains_batch() {
    let valve = build(Duration::from_millis(20), 2, 10, 1);
    let token = CancelToken::new();
    for i in 1..=4 {
        valve.add(&token, i).expect("Add failed");
    }
    let workers = valve.spawn_workers(1, &token).expect("Spawn failed");
    assert!(wait_until(Duration::from_secs(2), || {
        valve.get_outin_counter() == 1 && valve.get_in_counter() == 0
    }));

    // A full batch stops the worker from taking more input.
    valve.add(&token, 5).expect("Add failed");
    thread::sleep(Duration::from_millis(150));
    assert_eq!(valve.get_outin_counter(), 1);
    assert_eq!(valve.output_len(), 1);
    assert_eq!(valve.get_in_counter(), 1);
    assert!(valve.metrics().deferred_flushes() > 0);

    let batches = valve.receive();
    assert_eq!(batches.recv().unwrap(), vec![1, 2]);
    valve.done_in_counter();
    assert_eq!(
        batches.recv_timeout(Duration::from_secs(2)).unwrap(),
        vec![3, 4]
    );
    valve.done_in_counter();
    assert_eq!(
        batches.recv_timeout(Duration::from_secs(2)).unwrap(),
        vec![5]
    );
    valve.done_in_counter();

    assert!(wait_until(Duration::from_secs(1), || valve.get_outin_counter() == 0));
    assert_eq!(valve.metrics().items_discarded(), 0);

    token.cancel();
    for handle in workers {
        assert!(handle.join().unwrap().unwrap_err().is_cancellation());
    }
}

#[test]
fn test_cancel_discards_private_batch() {
    let valve = build(Duration::from_secs(60), 5, 10, 10);
    let token = CancelToken::new();
    let workers = valve.spawn_workers(1, &token).expect("Spawn failed");

    valve.add(&token, 1).expect("Add failed");
    valve.add(&token, 2).expect("Add failed");
    assert!(wait_until(Duration::from_secs(2), || valve.get_in_counter() == 0));

    token.cancel();
    for handle in workers {
        assert_eq!(handle.join().unwrap(), Err(ValveError::Cancelled));
    }

    assert!(valve.receive().try_recv().is_err());
    assert_eq!(valve.get_in_counter(), 0);
    assert_eq!(valve.get_outin_counter(), 0);
    assert_eq!(valve.metrics().items_discarded(), 2);
}

#[test]
fn test_single_slot_input_rejects_second_add() {
    let valve = build(Duration::from_millis(50), 4, 1, 1);
    let token = CancelToken::new();

    valve.add(&token, 1).expect("Add failed");
    assert_eq!(valve.add(&token, 2), Err(ValveError::UnableToEnqueue));
    assert_eq!(valve.get_in_counter(), 1);
}

#[test]
fn test_no_loss_no_duplication_single_worker() {
    let valve = build(Duration::from_millis(10), 8, 16, 4);
    let token = CancelToken::new();
    let workers = valve.spawn_workers(1, &token).expect("Spawn failed");

    let consumer = {
        let valve = valve.clone();
        thread::spawn(move || {
            let mut seen = Vec::new();
            let mut sizes = Vec::new();
            while seen.len() < 300 {
                let batch = valve
                    .receive()
                    .recv_timeout(Duration::from_secs(5))
                    .expect("Batch missing");
                valve.done_in_counter();
                sizes.push(batch.len());
                seen.extend(batch);
            }
            (seen, sizes)
        })
    };

    for i in 0..300 {
        loop {
            match valve.add(&token, i) {
                Ok(()) => break,
                Err(ValveError::UnableToEnqueue) => thread::sleep(Duration::from_micros(50)),
                Err(e) => panic!("Unexpected error: {e}"),
            }
        }
    }

    let (seen, sizes) = consumer.join().unwrap();
    // One producer and one worker keep the input order.
    assert_eq!(seen, (0..300).collect::<Vec<_>>());
    assert!(sizes.iter().all(|&len| (1..=8).contains(&len)));
    assert!(wait_until(Duration::from_secs(1), || valve.get_in_counter() == 0));
    assert_eq!(valve.get_outin_counter(), 0);

    token.cancel();
    for handle in workers {
        let _ = handle.join().unwrap();
    }
}

#[test]
fn test_worker_pool_with_blocking_producers() {
    let valve = build(Duration::from_millis(10), 7, 32, 8);
    let token = CancelToken::new();
    let workers = valve.spawn_workers(4, &token).expect("Spawn failed");

    let producers: Vec<_> = (0..4u32)
        .map(|p| {
            let valve = valve.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    valve.badd(p * 1000 + i).expect("BAdd failed");
                }
            })
        })
        .collect();

    let received = Arc::new(AtomicUsize::new(0));
    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let valve = valve.clone();
            let received = Arc::clone(&received);
            thread::spawn(move || {
                let mut items = Vec::new();
                while received.load(Ordering::SeqCst) < 1000 {
                    if let Ok(batch) = valve.receive().recv_timeout(Duration::from_millis(50)) {
                        assert!((1..=7).contains(&batch.len()));
                        valve.done_in_counter();
                        received.fetch_add(batch.len(), Ordering::SeqCst);
                        items.extend(batch);
                    }
                }
                items
            })
        })
        .collect();

    for producer in producers {
        producer.join().unwrap();
    }
    let mut all: Vec<u32> = consumers
        .into_iter()
        .flat_map(|c| c.join().unwrap())
        .collect();
    all.sort_unstable();

    let mut expected: Vec<u32> = (0..4u32)
        .flat_map(|p| (0..250).map(move |i| p * 1000 + i))
        .collect();
    expected.sort_unstable();
    assert_eq!(all, expected);
    assert_eq!(valve.metrics().items_flushed(), 1000);
    assert_eq!(valve.lag().pending_in, 0);

    token.cancel();
    for handle in workers {
        assert_eq!(handle.join().unwrap(), Err(ValveError::Cancelled));
    }
}

#[test]
fn test_in_counter_never_negative() {
    let valve = build(Duration::from_millis(5), 3, 4, 64);
    let token = CancelToken::new();
    let workers = valve.spawn_workers(2, &token).expect("Spawn failed");

    let observer = {
        let valve = valve.clone();
        let token = token.clone();
        thread::spawn(move || {
            let mut min = 0;
            while !token.is_cancelled() {
                min = min.min(valve.get_in_counter()).min(valve.get_outin_counter());
            }
            min
        })
    };
    let drain = {
        let valve = valve.clone();
        let token = token.clone();
        thread::spawn(move || {
            while !token.is_cancelled() {
                if valve.receive().recv_timeout(Duration::from_millis(5)).is_ok() {
                    valve.done_in_counter();
                }
            }
        })
    };

    for i in 0..500 {
        let _ = valve.add(&token, i);
    }
    thread::sleep(Duration::from_millis(100));
    token.cancel();

    assert_eq!(observer.join().unwrap(), 0);
    drain.join().unwrap();
    for handle in workers {
        let _ = handle.join().unwrap();
    }
}

#[test]
fn test_task_group_composition() {
    let valve = build(Duration::from_millis(20), 10, 100, 2);
    let root = CancelToken::new();
    let mut group = TaskGroup::new(&root);
    let consumed = Arc::new(AtomicUsize::new(0));

    for p in 0..2 {
        let valve = valve.clone();
        group
            .spawn(format!("producer-{p}"), move |token| {
                for i in 0..50 {
                    let call = token.child_with_timeout(Duration::from_millis(100));
                    while let Err(err) = valve.add(&call, i) {
                        if err.is_cancellation() {
                            return Err(err);
                        }
                        thread::sleep(Duration::from_millis(1));
                    }
                }
                Ok(())
            })
            .unwrap();
    }
    for w in 0..2 {
        let valve = valve.clone();
        group
            .spawn(format!("worker-{w}"), move |token| valve.start(&token))
            .unwrap();
    }
    {
        let valve = valve.clone();
        let consumed = Arc::clone(&consumed);
        group
            .spawn("consumer", move |token| {
                let batches = valve.receive();
                let done = token.done();
                loop {
                    crossbeam::select! {
                        recv(batches) -> batch => {
                            let batch = batch.map_err(|e| ValveError::Thread(e.to_string()))?;
                            valve.done_in_counter();
                            if consumed.fetch_add(batch.len(), Ordering::SeqCst) + batch.len() == 100 {
                                token.cancel();
                            }
                        }
                        recv(done) -> _ => return Err(ValveError::Cancelled),
                    }
                }
            })
            .unwrap();
    }

    assert_eq!(group.wait(), Err(ValveError::Cancelled));
    assert_eq!(consumed.load(Ordering::SeqCst), 100);
    assert!(!root.is_cancelled());
}
