//! Admission control across processes sharing one SQLite store

mod common;

use common::{scenario_registry, Process, SharedDatabase};
use gatekeeper_core::port::time_provider::mocks::ManualClock;
use gatekeeper_core::port::time_provider::SystemTimeProvider;
use gatekeeper_core::port::{KeyValueStore, TimeProvider};
use std::sync::Arc;
use std::time::Duration;

fn system_clock() -> Arc<dyn TimeProvider> {
    Arc::new(SystemTimeProvider)
}

/// Five jobs on q1 ({1 per 60s}), three processes polling at once:
/// exactly one job is handed out and four stay queued.
#[tokio::test]
async fn test_single_job_per_window_across_processes() {
    let db = SharedDatabase::new().await;
    let registry = scenario_registry();
    let mut processes = Vec::new();
    for _ in 0..3 {
        processes.push(db.process(registry.clone(), system_clock()).await);
    }
    processes[0].enqueue_many("q1", 5).await;

    let queues = Process::queues(&["q1"]);
    let mut handles = Vec::new();
    for process in &processes {
        for _ in 0..4 {
            let coordinator = process.coordinator.clone();
            let queues = queues.clone();
            handles.push(tokio::spawn(async move {
                coordinator.reserve(&queues).await.unwrap()
            }));
        }
    }

    let reserved: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap())
        .collect();

    assert_eq!(reserved.len(), 1);
    assert_eq!(processes[1].queue.pending_count("q1").await.unwrap(), 4);
    assert_eq!(
        processes[2].throttler.status("q1").await.unwrap().throughput_count,
        1
    );
    // Lock was released on every path
    assert!(!processes[0].throttler.status("q1").await.unwrap().locked);
}

/// Sequential cycles never admit more than the window allows, no matter
/// which process asks.
#[tokio::test]
async fn test_throughput_limit_holds_over_many_cycles() {
    let db = SharedDatabase::new().await;
    let registry = scenario_registry();
    let a = db.process(registry.clone(), system_clock()).await;
    let b = db.process(registry, system_clock()).await;
    a.enqueue_many("q2", 8).await;

    let queues = Process::queues(&["q2"]);
    let mut reserved = 0;
    for round in 0..8 {
        let process = if round % 2 == 0 { &a } else { &b };
        if let Some(job) = process.coordinator.reserve(&queues).await.unwrap() {
            assert_eq!(job.queue, "q2");
            reserved += 1;
        }
    }

    assert_eq!(reserved, 5);
    assert_eq!(b.queue.pending_count("q2").await.unwrap(), 3);
}

#[tokio::test]
async fn test_window_expiry_admits_next_job() {
    let db = SharedDatabase::new().await;
    let clock = Arc::new(ManualClock::default());
    let a = db.process(scenario_registry(), clock.clone()).await;
    let b = db.process(scenario_registry(), clock.clone()).await;
    a.enqueue_many("q1", 2).await;

    let queues = Process::queues(&["q1"]);
    assert!(a.coordinator.reserve(&queues).await.unwrap().is_some());
    assert!(b.coordinator.reserve(&queues).await.unwrap().is_none());

    clock.advance(Duration::from_secs(60));
    assert!(b.coordinator.reserve(&queues).await.unwrap().is_some());
}

/// q2 allows two jobs in flight; a third waits until one finishes.
#[tokio::test]
async fn test_concurrency_limit_across_processes() {
    let db = SharedDatabase::new().await;
    let registry = scenario_registry();
    let a = db.process(registry.clone(), system_clock()).await;
    let b = db.process(registry, system_clock()).await;
    a.enqueue_many("q2", 4).await;
    let queues = Process::queues(&["q2"]);

    for process in [&a, &b] {
        let job = process.coordinator.reserve(&queues).await.unwrap();
        assert!(job.is_some());
        process.throttler.concurrency().on_job_start("q2").await.unwrap();
    }

    assert!(a.coordinator.reserve(&queues).await.unwrap().is_none());
    assert!(b.coordinator.reserve(&queues).await.unwrap().is_none());

    b.throttler.concurrency().on_job_end("q2").await.unwrap();
    assert!(a.coordinator.reserve(&queues).await.unwrap().is_some());
    assert_eq!(a.throttler.status("q2").await.unwrap().active_jobs, 1);
}

/// q3 has no limit: it bypasses the lock even while another process
/// holds the key, and leaves no throttling keys behind.
#[tokio::test]
async fn test_unthrottled_queue_bypasses_lock() {
    let db = SharedDatabase::new().await;
    let registry = scenario_registry();
    let a = db.process(registry.clone(), system_clock()).await;
    let b = db.process(registry, system_clock()).await;
    a.enqueue_many("q3", 3).await;

    assert!(b.throttler.lock().try_acquire("q3").await.unwrap());

    let queues = Process::queues(&["q3"]);
    for _ in 0..3 {
        assert!(a.coordinator.reserve(&queues).await.unwrap().is_some());
    }
    assert_eq!(a.store.get("throttle:rate_limit:q3").await.unwrap(), None);
    assert_eq!(a.store.get("throttle:active_jobs:q3").await.unwrap(), None);
}

/// A full window on a higher-priority queue falls through to the next one.
#[tokio::test]
async fn test_full_queue_falls_through_to_next_priority() {
    let db = SharedDatabase::new().await;
    let a = db.process(scenario_registry(), system_clock()).await;
    a.enqueue_many("q1", 2).await;
    a.enqueue_many("q3", 1).await;

    let queues = Process::queues(&["q1", "q3"]);
    let first = a.coordinator.reserve(&queues).await.unwrap().unwrap();
    let second = a.coordinator.reserve(&queues).await.unwrap().unwrap();

    assert_eq!(first.queue, "q1");
    assert_eq!(second.queue, "q3");
    assert!(a.coordinator.reserve(&queues).await.unwrap().is_none());
}

/// A process that dies holding the lock blocks the queue until the lock
/// expires, and no longer.
#[tokio::test]
async fn test_crashed_lock_holder_recovers_after_ttl() {
    let db = SharedDatabase::new().await;
    let clock = Arc::new(ManualClock::default());
    let crashed = db.process(scenario_registry(), clock.clone()).await;
    let survivor = db.process(scenario_registry(), clock.clone()).await;
    survivor.enqueue_many("q2", 1).await;

    assert!(crashed.throttler.lock().try_acquire("q2").await.unwrap());
    crashed.pool.close().await;

    let queues = Process::queues(&["q2"]);
    assert!(survivor.coordinator.reserve(&queues).await.unwrap().is_none());

    clock.advance(Duration::from_secs(31));
    assert!(survivor.coordinator.reserve(&queues).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reset_from_another_process_reopens_queue() {
    let db = SharedDatabase::new().await;
    let worker = db.process(scenario_registry(), system_clock()).await;
    let admin = db.process(scenario_registry(), system_clock()).await;
    worker.enqueue_many("q1", 2).await;
    let queues = Process::queues(&["q1"]);

    assert!(worker.coordinator.reserve(&queues).await.unwrap().is_some());
    assert!(worker.coordinator.reserve(&queues).await.unwrap().is_none());

    let reset = admin.throttler.reset_throttling(None).await.unwrap();
    assert_eq!(reset, vec!["q1".to_string(), "q2".to_string()]);

    assert!(worker.coordinator.reserve(&queues).await.unwrap().is_some());
}

/// Expired counters are purged without affecting live keys.
#[tokio::test]
async fn test_purge_expired_keeps_live_state() {
    let db = SharedDatabase::new().await;
    let clock = Arc::new(ManualClock::default());
    let a = db.process(scenario_registry(), clock.clone()).await;
    a.enqueue_many("q1", 1).await;
    a.enqueue_many("q2", 1).await;

    let q1 = Process::queues(&["q1"]);
    let q2 = Process::queues(&["q2"]);
    assert!(a.coordinator.reserve(&q2).await.unwrap().is_some());
    clock.advance(Duration::from_secs(10));
    assert!(a.coordinator.reserve(&q1).await.unwrap().is_some());

    // q2's five-second window is gone, q1's minute window is not
    assert_eq!(a.store.purge_expired().await.unwrap(), 1);
    assert_eq!(a.throttler.status("q1").await.unwrap().throughput_count, 1);
    assert_eq!(a.throttler.status("q2").await.unwrap().throughput_count, 0);
}
