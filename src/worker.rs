// src/worker.rs

use crate::limiter::{LimiterError, RateLimiter};
use std::future::Future;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Size of one read, and the number of limiter tokens it costs.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Errors that end a read loop, a workload group or a job run.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("rate limiter error: {0}")]
    Limiter(#[from] LimiterError),
    #[error("glob {0} expands to empty set")]
    EmptyDirectory(String),
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("read loop task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("gave up after {restarts} restarts: {source}")]
    RestartsExhausted {
        restarts: u32,
        #[source]
        source: io::Error,
    },
}

impl WorkloadError {
    /// True when a file that was matched by a scan could not be found at open time.
    pub fn is_missing_file(&self) -> bool {
        matches!(self, WorkloadError::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

/// Hands out a freshly opened stream each time a read loop needs one.
pub trait StreamOpener: Send + Sync {
    type Stream: AsyncRead + Unpin + Send;

    fn open(&self) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// The busy-work unit: throttled block reads, rotating streams on end-of-stream.
#[derive(Debug, Clone, Copy)]
pub struct ReadLoop {
    block_size: usize,
}

impl ReadLoop {
    pub fn new(block_size: usize) -> Self {
        Self { block_size }
    }

    /// Runs until `cancel` fires (returns `Ok`) or a read, open or limiter error occurs.
    ///
    /// Only the limiter wait observes cancellation; a read that has started is
    /// allowed to finish. The current stream is always dropped before the next
    /// one is opened, so the loop never holds two handles.
    pub async fn run<L, O>(
        &self,
        limiter: &L,
        opener: &O,
        cancel: &CancellationToken,
    ) -> Result<(), WorkloadError>
    where
        L: RateLimiter + ?Sized,
        O: StreamOpener + ?Sized,
    {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let mut stream = opener.open().await?;
        let mut buf = vec![0u8; self.block_size];
        let cost = self.block_size as u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                granted = limiter.acquire(cost) => granted?,
            }

            let n = stream.read(&mut buf).await?;
            if n == 0 {
                debug!("end of stream, rotating to a new file");
                drop(stream);
                stream = opener.open().await?;
            }
        }
    }
}

/// Runs a fixed number of read loops under one limiter and one cancellation scope.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadGroup {
    parallelism: usize,
    block_size: usize,
}

impl WorkloadGroup {
    pub fn new(parallelism: usize, block_size: usize) -> Self {
        Self {
            parallelism,
            block_size,
        }
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Spawns exactly `parallelism` loops and waits for all of them.
    ///
    /// The first error cancels the remaining loops and is returned once they
    /// have drained; later errors are discarded. Cancelling `parent` ends the
    /// group with `Ok(())`.
    pub async fn run<L, O>(
        &self,
        limiter: Arc<L>,
        opener: Arc<O>,
        parent: &CancellationToken,
    ) -> Result<(), WorkloadError>
    where
        L: RateLimiter + 'static,
        O: StreamOpener + 'static,
    {
        let scope = parent.child_token();
        let mut join_set = JoinSet::new();

        for _ in 0..self.parallelism {
            let limiter = Arc::clone(&limiter);
            let opener = Arc::clone(&opener);
            let cancel = scope.clone();
            let read_loop = ReadLoop::new(self.block_size);
            join_set.spawn(async move {
                read_loop
                    .run(limiter.as_ref(), opener.as_ref(), &cancel)
                    .await
            });
        }

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined.map_err(WorkloadError::from).and_then(|res| res);
            if let Err(e) = outcome {
                if first_error.is_none() {
                    scope.cancel();
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
