// src/runner.rs

use crate::limiter::RateLimiter;
use crate::worker::{StreamOpener, WorkloadError, WorkloadGroup};
use rand::Rng;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to do when a run attempt hits a file that vanished after the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// `None` restarts forever.
    pub max_restarts: Option<u32>,
    /// Pause between a missing-file failure and the next scan.
    pub backoff: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: None,
            backoff: Duration::ZERO,
        }
    }
}

/// Expands `pattern` into the non-directory paths it currently matches.
///
/// Entries that cannot be read while globbing are skipped. Dangling symlinks
/// are kept; opening them reports a missing file.
pub fn scan_files(pattern: &str) -> Result<Vec<PathBuf>, WorkloadError> {
    let files: Vec<PathBuf> = glob::glob(pattern)?
        .filter_map(Result::ok)
        .filter(|path| !path.is_dir())
        .collect();
    Ok(files)
}

/// `scan_files` on the blocking pool, so a slow directory never stalls the runtime.
pub async fn scan_files_blocking(pattern: &str) -> Result<Vec<PathBuf>, WorkloadError> {
    let pattern = pattern.to_string();
    tokio::task::spawn_blocking(move || scan_files(&pattern)).await?
}

/// Opens a uniformly random file out of a fixed snapshot.
#[derive(Debug)]
pub struct RandomFileOpener {
    files: Vec<PathBuf>,
}

impl RandomFileOpener {
    /// Returns `None` for an empty snapshot.
    pub fn new(files: Vec<PathBuf>) -> Option<Self> {
        if files.is_empty() {
            None
        } else {
            Some(Self { files })
        }
    }

    fn choose(&self) -> &PathBuf {
        let idx = rand::thread_rng().gen_range(0..self.files.len());
        &self.files[idx]
    }
}

impl StreamOpener for RandomFileOpener {
    type Stream = File;

    fn open(&self) -> impl Future<Output = io::Result<File>> + Send {
        let path = self.choose().clone();
        async move { File::open(path).await }
    }
}

/// Runs one job's workload group over a glob, re-scanning when files disappear.
pub struct JobRunner<L> {
    pattern: String,
    group: WorkloadGroup,
    limiter: Arc<L>,
    policy: RestartPolicy,
}

impl<L: RateLimiter + 'static> JobRunner<L> {
    pub fn new(pattern: impl Into<String>, group: WorkloadGroup, limiter: Arc<L>) -> Self {
        Self {
            pattern: pattern.into(),
            group,
            limiter,
            policy: RestartPolicy::default(),
        }
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Runs until cancelled (`Ok`) or until a non-restartable error occurs.
    ///
    /// An empty scan is fatal and not retried. A missing file triggers a fresh
    /// scan and a new group, bounded only by the restart policy.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<(), WorkloadError> {
        let mut restarts: u32 = 0;

        loop {
            let files = scan_files_blocking(&self.pattern).await?;
            let opener = RandomFileOpener::new(files)
                .ok_or_else(|| WorkloadError::EmptyDirectory(self.pattern.clone()))?;
            debug!(
                pattern = %self.pattern,
                files = opener.files.len(),
                loops = self.group.parallelism(),
                "starting workload group"
            );

            let err = match self
                .group
                .run(Arc::clone(&self.limiter), Arc::new(opener), cancel)
                .await
            {
                Ok(()) => return Ok(()),
                Err(WorkloadError::Io(e)) if e.kind() == io::ErrorKind::NotFound => e,
                Err(e) => return Err(e),
            };

            if cancel.is_cancelled() {
                return Ok(());
            }

            if let Some(max) = self.policy.max_restarts {
                if restarts >= max {
                    return Err(WorkloadError::RestartsExhausted {
                        restarts,
                        source: err,
                    });
                }
            }

            restarts += 1;
            warn!(
                pattern = %self.pattern,
                restarts,
                error = %err,
                "file not found, the file dir might be modified; restarting"
            );

            if !self.policy.backoff.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(pattern = %self.pattern, "cancelled during restart backoff");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(self.policy.backoff) => {}
                }
            }
        }
    }
}
