//! Task lifecycle integration tests
//!
//! Local stops end a single instance, global stops end a whole kind, and the
//! stream ends cleanly when either the source or the operator says so.

mod common;

use common::builders::ConfigBuilder;
use common::{test_timeout, wait_until};
use framepipe::pipeline::Target;
use framepipe::PipelineBuilder;
use std::time::Duration;

#[test]
fn test_local_stop_ends_one_instance() {
    let config = ConfigBuilder::endless().workers(4).build();
    let mut pipeline = PipelineBuilder::new(config).build().unwrap();
    pipeline.start().unwrap();
    let workers = pipeline.worker_kind().to_string();

    assert!(wait_until(test_timeout(), || {
        pipeline.manager().running_count(&workers) == 4
    }));

    pipeline.manager_mut().stop_instance(&workers, 0);
    assert!(wait_until(test_timeout(), || {
        pipeline.manager().running_count(&workers) == 3
    }));

    // The rest keep serving
    let mut consumer = pipeline.consumer();
    assert!(consumer.next_timeout(test_timeout()).is_some());
    assert_eq!(pipeline.manager().desired_count(&workers), 4);

    pipeline.shutdown(test_timeout()).unwrap();
}

#[test]
fn test_global_stop_drains_kind() {
    let config = ConfigBuilder::endless().workers(4).build();
    let mut pipeline = PipelineBuilder::new(config).build().unwrap();
    pipeline.start().unwrap();
    let workers = pipeline.worker_kind().to_string();
    let producers = pipeline.producer_kind().to_string();

    pipeline.manager_mut().stop(&Target::kind(workers.as_str()));
    assert!(wait_until(test_timeout(), || {
        pipeline.manager().running_count(&workers) == 0
    }));
    // Only the named kind is affected
    assert_eq!(pipeline.manager().running_count(&producers), 1);

    // A stopped kind stays stopped: new instances exit right away
    pipeline.add_workers(1).unwrap();
    pipeline.start().unwrap();
    assert!(wait_until(test_timeout(), || {
        pipeline.manager().running_count(&workers) == 0
    }));

    pipeline.shutdown(test_timeout()).unwrap();
    assert_eq!(pipeline.manager().running_count(&producers), 0);
}

#[test]
fn test_unknown_kind_is_ignored() {
    let config = ConfigBuilder::endless().workers(2).build();
    let mut pipeline = PipelineBuilder::new(config).build().unwrap();
    pipeline.start().unwrap();
    let workers = pipeline.worker_kind().to_string();

    pipeline.manager_mut().stop(&Target::kind("worker:thermal"));
    pipeline.manager_mut().stop_instance("worker:thermal", 0);
    assert_eq!(pipeline.manager_mut().start(&Target::kind("worker:thermal")), 0);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(pipeline.manager().running_count(&workers), 2);

    pipeline.shutdown(test_timeout()).unwrap();
}

#[test]
fn test_stop_handle_ends_stream() {
    let config = ConfigBuilder::endless().workers(3).build();
    let mut pipeline = PipelineBuilder::new(config).build().unwrap();
    pipeline.start().unwrap();

    let stop = pipeline.stop_handle();
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        stop.stop_all();
    });

    // The consumer loop ends on its own once every worker has exited
    let mut consumer = pipeline.consumer();
    let delivered = consumer.by_ref().count();
    stopper.join().unwrap();

    assert!(delivered > 0);
    assert_eq!(consumer.stats().delivered, delivered as u64);
    assert!(pipeline.manager_mut().join(&Target::All, test_timeout()));
    pipeline.shutdown(test_timeout()).unwrap();
}

#[test]
fn test_finite_source_finishes_every_task() {
    let config = ConfigBuilder::new(30).workers(3).build();
    let mut pipeline = PipelineBuilder::new(config).build().unwrap();
    pipeline.start().unwrap();

    assert_eq!(pipeline.consumer().count(), 30);
    assert!(pipeline.manager_mut().join(&Target::All, test_timeout()));
    assert_eq!(pipeline.manager().running_count(pipeline.producer_kind()), 0);
    assert_eq!(pipeline.manager().running_count(pipeline.worker_kind()), 0);

    pipeline.shutdown(Duration::from_secs(1)).unwrap();
}
