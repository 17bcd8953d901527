//! Backpressure integration tests
//!
//! With nobody consuming, both bounded queues fill up and the producer stops
//! acquiring. Nothing is dropped.

mod common;

use common::builders::ConfigBuilder;
use common::mock_helpers::counting_source;
use common::{test_timeout, wait_until};
use framepipe::pipeline::{PipelineTask, Producer, ProducerRegistry, Target};
use framepipe::PipelineBuilder;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUEUE_CAPACITY: usize = 4;
const SINK_CAPACITY: usize = 3;
const WORKERS: usize = 2;

/// Sink full, one unit held by each blocked worker, queue full, one frame in
/// the producer's hand
const MAX_IN_FLIGHT: u64 = (SINK_CAPACITY + WORKERS + QUEUE_CAPACITY + 1) as u64;

fn counting_producers(acquired: Arc<AtomicU64>) -> ProducerRegistry {
    let mut producers = ProducerRegistry::with_builtins();
    producers.register("counting", move |ctx| {
        Ok(Box::new(Producer::new(
            ctx.kind,
            ctx.index,
            Box::new(counting_source(acquired.clone())),
            ctx.queue,
            ctx.flags,
        )) as Box<dyn PipelineTask>)
    });
    producers
}

/// Wait until `counter` stops changing for `quiet`
fn settle(counter: &AtomicU64, quiet: Duration) -> u64 {
    let mut last = counter.load(Ordering::SeqCst);
    loop {
        std::thread::sleep(quiet);
        let now = counter.load(Ordering::SeqCst);
        if now == last {
            return now;
        }
        last = now;
    }
}

#[test]
fn test_producer_blocks_without_consumer() {
    let acquired = Arc::new(AtomicU64::new(0));
    let config = ConfigBuilder::endless()
        .producer_kind("counting")
        .workers(WORKERS)
        .queue_capacity(QUEUE_CAPACITY)
        .sink_capacity(SINK_CAPACITY)
        .build();
    let mut pipeline = PipelineBuilder::new(config)
        .with_producers(counting_producers(acquired.clone()))
        .build()
        .unwrap();
    pipeline.start().unwrap();

    let stalled_at = settle(&acquired, Duration::from_millis(100));
    assert!(
        stalled_at <= MAX_IN_FLIGHT,
        "acquired {stalled_at} frames with at most {MAX_IN_FLIGHT} in flight"
    );
    assert_eq!(pipeline.sink().len(), SINK_CAPACITY);
    assert_eq!(pipeline.ingress_len(), QUEUE_CAPACITY);

    // Draining resumes acquisition
    let mut consumer = pipeline.consumer();
    for _ in 0..5 {
        assert!(consumer.next_timeout(test_timeout()).is_some());
    }
    assert!(wait_until(test_timeout(), || {
        acquired.load(Ordering::SeqCst) > stalled_at
    }));

    pipeline.shutdown(test_timeout()).unwrap();
    assert_eq!(pipeline.manager().running_count(pipeline.worker_kind()), 0);
    assert_eq!(pipeline.manager().running_count(pipeline.producer_kind()), 0);
}

#[test]
fn test_shutdown_interrupts_blocked_tasks() {
    let acquired = Arc::new(AtomicU64::new(0));
    let config = ConfigBuilder::endless()
        .producer_kind("counting")
        .workers(WORKERS)
        .queue_capacity(1)
        .sink_capacity(1)
        .build();
    let mut pipeline = PipelineBuilder::new(config)
        .with_producers(counting_producers(acquired.clone()))
        .build()
        .unwrap();
    pipeline.start().unwrap();
    settle(&acquired, Duration::from_millis(50));

    // Every task is parked on a full queue; the stop flags must still reach them
    pipeline.stop();
    assert!(pipeline
        .manager_mut()
        .join(&Target::All, test_timeout()));
    pipeline.shutdown(test_timeout()).unwrap();
}
