// src/models.rs

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The status of a busy-work job.
///
/// A job only exits cleanly when it is stopped, and stopping removes it from
/// the registry, so there is no terminal success state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    /// The runner gave up; the job stays registered until it is stopped.
    Failed(Option<String>),
}

/// Snapshot of one job as seen by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusyJob {
    pub id: String,
    /// Number of concurrent read loops.
    pub parallelism: usize,
    /// Aggregate ceiling across all loops, in bytes per second.
    pub rate_limit: u64,
    pub burst: u64,
    pub status: JobStatus,
    /// Seconds since the Unix epoch.
    pub started_at: u64,
}

impl BusyJob {
    pub fn new(id: String, parallelism: usize, rate_limit: u64, burst: u64) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            id,
            parallelism,
            rate_limit,
            burst,
            status: JobStatus::Running,
            started_at,
        }
    }
}

/// Body of `POST /busy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBusyRequest {
    #[serde(rename = "n")]
    pub parallelism: usize,
    /// Human-readable byte rate per second, e.g. `"10MB"`.
    pub rate_limit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddBusyResponse {
    pub id: String,
}
