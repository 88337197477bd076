pub mod config;
pub mod ids;
pub mod limiter;
pub mod manager;
pub mod models;
pub mod runner;
pub mod server;
pub mod units;
pub mod worker;

/// Convenient type alias exposing common structs.
pub mod prelude {
    pub use crate::config::{CliArgs, ServiceConfig};
    pub use crate::ids::{IdProvider, UuidProvider};
    pub use crate::limiter::{RateLimiter, SpeedLimiter};
    pub use crate::manager::{RegistryConfig, RegistryError, WorkloadRegistry};
    pub use crate::models::{BusyJob, JobStatus};
    pub use crate::runner::{JobRunner, RestartPolicy};
    pub use crate::units::parse_human_size;
    pub use crate::worker::{ReadLoop, StreamOpener, WorkloadError, WorkloadGroup};
}
