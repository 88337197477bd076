// src/manager.rs

use crate::ids::{IdError, IdProvider};
use crate::limiter::SpeedLimiter;
use crate::models::{BusyJob, JobStatus};
use crate::runner::{JobRunner, RestartPolicy};
use crate::worker::{WorkloadGroup, DEFAULT_BLOCK_SIZE};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("parallelism must be at least 1")]
    InvalidParallelism,
    #[error("rate limit must be a positive number of bytes per second")]
    InvalidRate,
    #[error(transparent)]
    Id(#[from] IdError),
    #[error("id {0:?} is already in use")]
    DuplicateId(String),
}

/// Settings shared by every job the registry starts.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Glob pattern naming the files to read.
    pub pattern: String,
    pub block_size: usize,
    pub restart: RestartPolicy,
}

impl RegistryConfig {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            block_size: DEFAULT_BLOCK_SIZE,
            restart: RestartPolicy::default(),
        }
    }
}

/// Everything needed to stop one job and report on it.
struct JobHandle {
    job: Arc<Mutex<BusyJob>>,
    cancellation_token: CancellationToken,
    limiter: SpeedLimiter,
    worker: JoinHandle<()>,
}

/// Owns every running job, keyed by its id.
pub struct WorkloadRegistry {
    config: RegistryConfig,
    ids: Arc<dyn IdProvider>,
    root: CancellationToken,
    jobs: Mutex<HashMap<String, JobHandle>>,
}

impl WorkloadRegistry {
    pub fn new(config: RegistryConfig, ids: Arc<dyn IdProvider>) -> Self {
        Self {
            config,
            ids,
            root: CancellationToken::new(),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Launches a job of `parallelism` read loops sharing one limiter and returns its id.
    ///
    /// Returns as soon as the job is registered; failures of the job itself are
    /// only logged and recorded in its status.
    pub async fn start(&self, parallelism: usize, rate_limit: u64) -> Result<String, RegistryError> {
        if parallelism == 0 {
            return Err(RegistryError::InvalidParallelism);
        }
        if rate_limit == 0 {
            return Err(RegistryError::InvalidRate);
        }

        let id = self.ids.generate_id()?;
        // A single block must always fit in the bucket.
        let burst = rate_limit.max(self.config.block_size as u64);
        let limiter = SpeedLimiter::with_burst(rate_limit, burst);
        let cancellation_token = self.root.child_token();
        let job = Arc::new(Mutex::new(BusyJob::new(
            id.clone(),
            parallelism,
            rate_limit,
            burst,
        )));

        let runner = JobRunner::new(
            self.config.pattern.clone(),
            WorkloadGroup::new(parallelism, self.config.block_size),
            Arc::new(limiter.clone()),
        )
        .with_restart_policy(self.config.restart);

        // Hold the map while spawning so a duplicate id never gets a task.
        let mut jobs = self.jobs.lock().await;
        let Entry::Vacant(slot) = jobs.entry(id.clone()) else {
            return Err(RegistryError::DuplicateId(id));
        };

        let worker = {
            let job = Arc::clone(&job);
            let token = cancellation_token.clone();
            let id = id.clone();
            tokio::spawn(async move {
                // Ok only comes from cancellation; the entry is already gone by then.
                match runner.run(&token).await {
                    Ok(()) => info!(%id, "workload stopped"),
                    Err(e) => {
                        warn!(%id, error = %e, "error during running busy work");
                        job.lock().await.status = JobStatus::Failed(Some(e.to_string()));
                    }
                }
            })
        };

        slot.insert(JobHandle {
            job,
            cancellation_token,
            limiter,
            worker,
        });
        drop(jobs);

        info!(%id, parallelism, rate_limit, burst, "added workload");
        Ok(id)
    }

    /// Cancels and forgets the job `id`, waiting for its loops to exit.
    ///
    /// Returns `false` if no such job is registered, including a job that was
    /// already stopped.
    pub async fn stop(&self, id: &str) -> bool {
        let Some(handle) = self.jobs.lock().await.remove(id) else {
            return false;
        };

        handle.cancellation_token.cancel();
        if let Err(e) = handle.worker.await {
            warn!(%id, error = %e, "workload task did not exit cleanly");
        }
        info!(%id, granted_bytes = handle.limiter.granted(), "deleted workload");
        true
    }

    /// Snapshot of one job.
    pub async fn job(&self, id: &str) -> Option<BusyJob> {
        let job = {
            let jobs = self.jobs.lock().await;
            Arc::clone(&jobs.get(id)?.job)
        };
        let snapshot = job.lock().await.clone();
        Some(snapshot)
    }

    /// Snapshot of every registered job, oldest first.
    pub async fn jobs(&self) -> Vec<BusyJob> {
        let handles: Vec<_> = {
            let jobs = self.jobs.lock().await;
            jobs.values().map(|h| Arc::clone(&h.job)).collect()
        };
        let mut result = Vec::with_capacity(handles.len());
        for job in handles {
            result.push(job.lock().await.clone());
        }
        result.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        result
    }

    /// Cancels every job and waits for all of them to exit.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let handles: Vec<(String, JobHandle)> = self.jobs.lock().await.drain().collect();
        for (id, handle) in handles {
            if let Err(e) = handle.worker.await {
                warn!(%id, error = %e, "workload task did not exit cleanly");
            }
        }
        info!("all workloads stopped");
    }
}
