//! # Pipeline Error Types
//!
//! Error taxonomy for the metrics pipeline. Transient infrastructure errors
//! (pool exhaustion, connection timeouts) are retried by the concurrency layer
//! and recorded as item failures; only configuration errors are allowed to
//! fail initialization outright.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Database query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connection pool saturated past the acquire timeout
    #[error("Connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    /// Circuit breaker rejected new work
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Bulk computation summary failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid pipeline configuration (the only class that may fail init)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Platform aggregation failure
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Scheduler job dispatch failure
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl PipelineError {
    /// Transient errors are retried by the concurrency manager before being
    /// recorded as item failures.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::PoolExhausted { .. } => true,
            PipelineError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhaustion_is_transient() {
        let err = PipelineError::PoolExhausted {
            waited: Duration::from_secs(30),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn test_configuration_error_is_not_transient() {
        let err = PipelineError::Configuration("bad pool size".to_string());
        assert!(!err.is_transient());
    }
}
