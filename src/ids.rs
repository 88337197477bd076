// src/ids.rs

use thiserror::Error;

#[derive(Debug, Error)]
#[error("could not generate a job id: {0}")]
pub struct IdError(pub String);

/// Source of job identifiers. Every call must return a value never seen before.
pub trait IdProvider: Send + Sync {
    fn generate_id(&self) -> Result<String, IdError>;
}

/// UUID v4 provider used by the service.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> Result<String, IdError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
