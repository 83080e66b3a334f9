//! # Concurrency
//!
//! The only place parallelism is introduced in the pipeline. Fan-out is
//! bounded here and every parallel unit funnels through the database pool, so
//! total concurrent database work stays capped no matter how many logical
//! workers exist.

pub mod circuit_breaker;
pub mod manager;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot};
pub use manager::{
    BatchOutcome, BatchOverrides, ConcurrencyManager, ItemFailure, ProcessingStats,
};
pub use retry::RetryPolicy;
