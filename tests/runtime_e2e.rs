mod common;

use std::time::Duration;

use common::{fear_under_threat, simulator};
use exprdiag::{RuntimeConfig, SimulationConfig, SimulationRuntime};

#[test]
fn pooled_runs_are_deterministic_and_independent() {
    let runtime = SimulationRuntime::new(
        simulator(),
        RuntimeConfig {
            workers: 3,
            queue_capacity: 16,
        },
    )
    .unwrap();

    let handles: Vec<_> = (0..6_u64)
        .map(|i| {
            runtime
                .submit(fear_under_threat(), SimulationConfig::seeded(300, i % 2))
                .unwrap()
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join_timeout(Duration::from_secs(30)).unwrap())
        .collect();

    for pair in results.chunks(2) {
        assert_ne!(pair[0].simulation_id, pair[1].simulation_id);
    }
    assert_eq!(results[0].simulation_id, results[2].simulation_id);
    assert_eq!(results[1].trigger_count, results[5].trigger_count);
}

#[test]
fn zero_workers_is_rejected() {
    let err = SimulationRuntime::new(
        simulator(),
        RuntimeConfig {
            workers: 0,
            queue_capacity: 4,
        },
    )
    .err()
    .unwrap();
    assert!(err.is_validation());
}

#[test]
fn dropping_the_runtime_finishes_queued_work() {
    let runtime = SimulationRuntime::new(simulator(), RuntimeConfig::default()).unwrap();
    let handle = runtime
        .submit(fear_under_threat(), SimulationConfig::seeded(200, 3))
        .unwrap();
    drop(runtime);
    assert_eq!(handle.join().unwrap().sample_count, 200);
}
