//! Bounded worker pool for running simulations off the caller's thread.
//!
//! Sampling inside one job stays single-threaded; the pool only provides
//! job-level parallelism and a non-blocking submission path for hosts that
//! must not stall on large sample counts.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DiagResult, ExecutionError, ValidationError};
use crate::expression::Expression;
use crate::simulation::{MonteCarloSimulator, SimulationConfig, SimulationResult};

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker threads.
    pub workers: usize,
    /// Maximum queued jobs.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
        }
    }
}

impl RuntimeConfig {
    /// Rejects zero workers or a zero-capacity queue.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::InvalidRuntimeConfig {
                reason: "workers must be > 0".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidRuntimeConfig {
                reason: "queue_capacity must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

enum Job {
    Simulate {
        expression: Expression,
        config: SimulationConfig,
        reply: Sender<DiagResult<SimulationResult>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(config: &RuntimeConfig, simulator: &Arc<MonteCarloSimulator>) -> DiagResult<Self> {
        let (tx, rx) = bounded::<Job>(config.queue_capacity);

        let mut handles = Vec::with_capacity(config.workers);
        for idx in 0..config.workers {
            let rx: Receiver<Job> = rx.clone();
            let simulator = Arc::clone(simulator);
            let spawned = thread::Builder::new()
                .name(format!("exprdiag-sim-{idx}"))
                .spawn(move || loop {
                    match rx.recv() {
                        Ok(Job::Simulate {
                            expression,
                            config,
                            reply,
                        }) => {
                            let result = simulator.simulate(&expression, &config);
                            let _ = reply.send(result);
                        }
                        Err(_) => break,

                        #[cfg(test)]
                        Ok(Job::Sleep { duration, reply }) => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    Self::join_all(tx, handles);
                    return Err(ExecutionError::WorkerSpawn { reason: e.to_string() }.into());
                }
            }
        }

        Ok(Self {
            tx,
            workers: handles,
            queue_capacity: config.queue_capacity,
        })
    }

    fn try_submit(&self, job: Job) -> DiagResult<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            }
            .into()),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected.into()),
        }
    }

    fn join_all(tx: Sender<Job>, workers: Vec<JoinHandle<()>>) {
        // Closing the channel lets workers drain queued jobs and exit.
        drop(tx);
        for handle in workers {
            let _ = handle.join();
        }
    }

    fn shutdown(self) {
        Self::join_all(self.tx, self.workers);
    }
}

/// Pending simulation.
pub struct SimulationHandle {
    rx: Receiver<DiagResult<SimulationResult>>,
}

impl SimulationHandle {
    /// Blocks until the simulation finishes.
    pub fn join(self) -> DiagResult<SimulationResult> {
        self.rx.recv().map_err(|_| ExecutionError::Disconnected)?
    }

    /// Blocks for at most `timeout`.
    pub fn join_timeout(self, timeout: Duration) -> DiagResult<SimulationResult> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
            RecvTimeoutError::Disconnected => ExecutionError::Disconnected,
        })?
    }
}

/// Runs simulations on a bounded pool of worker threads.
pub struct SimulationRuntime {
    simulator: Arc<MonteCarloSimulator>,
    pool: Option<WorkerPool>,
}

impl SimulationRuntime {
    /// Starts the worker pool.
    pub fn new(simulator: MonteCarloSimulator, config: RuntimeConfig) -> DiagResult<Self> {
        config.validate()?;
        let simulator = Arc::new(simulator);
        let pool = WorkerPool::start(&config, &simulator)?;
        debug!(workers = config.workers, queue_capacity = config.queue_capacity, "simulation runtime started");
        Ok(Self {
            simulator,
            pool: Some(pool),
        })
    }

    /// Queues a simulation without blocking.
    ///
    /// Fails with `QueueFull` when the queue is at capacity.
    pub fn submit(&self, expression: Expression, config: SimulationConfig) -> DiagResult<SimulationHandle> {
        let (reply, rx) = bounded::<DiagResult<SimulationResult>>(1);
        self.pool()?.try_submit(Job::Simulate {
            expression,
            config,
            reply,
        })?;
        Ok(SimulationHandle { rx })
    }

    /// Queues a simulation and waits for it.
    pub fn simulate(&self, expression: Expression, config: SimulationConfig) -> DiagResult<SimulationResult> {
        self.submit(expression, config)?.join()
    }

    /// Shared simulator.
    #[must_use]
    pub fn simulator(&self) -> &MonteCarloSimulator {
        &self.simulator
    }

    fn pool(&self) -> DiagResult<&WorkerPool> {
        self.pool.as_ref().ok_or_else(|| ExecutionError::Disconnected.into())
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> DiagResult<Receiver<()>> {
        let (reply, rx) = bounded::<()>(1);
        self.pool()?.try_submit(Job::Sleep { duration, reply })?;
        Ok(rx)
    }
}

impl Drop for SimulationRuntime {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{ComparisonOperator, LogicNode, Prerequisite};
    use crate::registry::InMemoryPrototypeRegistry;

    fn runtime(workers: usize, queue_capacity: usize) -> SimulationRuntime {
        let simulator = MonteCarloSimulator::new(Arc::new(InMemoryPrototypeRegistry::new()));
        SimulationRuntime::new(simulator, RuntimeConfig { workers, queue_capacity }).unwrap()
    }

    fn expression() -> Expression {
        Expression::new(
            "threat_high",
            vec![Prerequisite::new(LogicNode::leaf("moodAxes.threat", ComparisonOperator::Gte, 0.0))],
        )
        .unwrap()
    }

    #[test]
    fn config_validation() {
        assert!(RuntimeConfig::default().validate().is_ok());
        assert!(RuntimeConfig { workers: 0, queue_capacity: 1 }.validate().is_err());
        assert!(RuntimeConfig { workers: 1, queue_capacity: 0 }.validate().is_err());
    }

    #[test]
    fn submitted_simulation_matches_direct_call() {
        let rt = runtime(2, 8);
        let config = SimulationConfig::seeded(200, 11);
        let pooled = rt.submit(expression(), config.clone()).unwrap().join().unwrap();
        let direct = rt.simulator().simulate(&expression(), &config).unwrap();
        assert_eq!(pooled.trigger_count, direct.trigger_count);
        assert_eq!(pooled.simulation_id, direct.simulation_id);
    }

    #[test]
    fn full_queue_is_rejected() {
        let rt = runtime(1, 1);
        let busy = rt.submit_sleep(Duration::from_millis(300)).unwrap();
        // Give the single worker time to pick up the first job.
        thread::sleep(Duration::from_millis(50));
        let _queued = rt.submit_sleep(Duration::from_millis(1)).unwrap();
        let err = rt.submit(expression(), SimulationConfig::seeded(10, 1)).err().unwrap();
        assert!(err.is_retryable());
        busy.recv().unwrap();
    }

    #[test]
    fn join_timeout_reports_timeout() {
        let rt = runtime(1, 4);
        let _busy = rt.submit_sleep(Duration::from_millis(300)).unwrap();
        let handle = rt.submit(expression(), SimulationConfig::seeded(10, 1)).unwrap();
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn invalid_config_comes_back_through_the_handle() {
        let rt = runtime(1, 4);
        let err = rt.simulate(expression(), SimulationConfig::seeded(0, 1)).unwrap_err();
        assert!(err.is_validation());
    }
}
