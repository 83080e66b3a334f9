//! # Tenant Metrics Core
//!
//! Scheduled computation and aggregation pipeline for multi-tenant business
//! metrics. A single scheduler process fires calendar jobs; per-tenant
//! computation happens in one bulk database routine covering every analysis
//! period, and platform-wide rollups are folded from the resulting rows.
//!
//! ## Architecture
//!
//! - **scheduler**: cron-driven named jobs with an overlap guard and a manual
//!   trigger surface
//! - **calculator**: orchestration wrapper around the bulk computation
//!   routine; validates summaries, does no metric math itself
//! - **concurrency**: the only source of parallelism; bounded fan-out with
//!   per-item retry and a circuit breaker
//! - **database**: capped connection pool plus typed SQL function wrappers
//! - **aggregation**: pure fold from tenant rows to platform rollups, plus a
//!   consistency audit that reports drift without correcting it
//! - **cache**: best-effort TTL cache; unavailability degrades to recompute
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tenant_metrics_core::{MetricsPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     tenant_metrics_core::logging::init_structured_logging();
//!     let config = PipelineConfig::from_environment()?;
//!     let pipeline = MetricsPipeline::connect(config).await?;
//!     pipeline.run().await;
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod cache;
pub mod calculator;
pub mod concurrency;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod scheduler;

pub use aggregation::{ConsistencyReport, ConsistencyValidator, PlatformAggregationEngine};
pub use cache::{CacheStats, MetricsCache};
pub use calculator::TenantMetricsCalculator;
pub use concurrency::{BatchOutcome, BatchOverrides, ConcurrencyManager, ProcessingStats};
pub use config::PipelineConfig;
pub use database::{PoolHealth, PoolManager, SqlFunctionExecutor};
pub use error::{PipelineError, Result};
pub use models::{
    BulkComputationSummary, CalculationMethod, MetricPeriod, MetricType, PlatformMetricRecord,
    Tenant, TenantMetricRecord,
};
pub use scheduler::{JobKind, JobOutcome, MetricsScheduler, SchedulerStats};

use std::sync::Arc;
use tracing::info;

/// Point-in-time observability snapshot across the pipeline components
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub scheduler: SchedulerStats,
    pub processing: ProcessingStats,
    pub cache: CacheStats,
    pub pool: PoolHealth,
}

/// Fully wired pipeline: pool, cache, concurrency manager, calculator,
/// aggregation engine, validator and scheduler. Construction fails only on
/// configuration errors.
pub struct MetricsPipeline {
    pool: PoolManager,
    cache: Arc<MetricsCache>,
    manager: Arc<ConcurrencyManager>,
    scheduler: Arc<MetricsScheduler>,
}

impl MetricsPipeline {
    /// Build the pool from configuration, then wire the pipeline
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let pool = PoolManager::connect(&config.database).await?;
        Self::new(config, pool)
    }

    /// Wire the pipeline around an existing pool
    pub fn new(config: PipelineConfig, pool: PoolManager) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(MetricsCache::new(&config.cache));
        let executor = SqlFunctionExecutor::new(pool.pool().clone());
        let manager = Arc::new(ConcurrencyManager::new(config.concurrency.clone()));

        let calculator = Arc::new(TenantMetricsCalculator::new(
            executor.clone(),
            cache.clone(),
            config.cache.clone(),
        ));
        let engine = Arc::new(PlatformAggregationEngine::new(
            executor.clone(),
            cache.clone(),
            config.aggregation.clone(),
            config.cache.clone(),
        ));
        let validator = Arc::new(ConsistencyValidator::new(
            executor.clone(),
            config.aggregation.clone(),
        ));
        let scheduler = Arc::new(MetricsScheduler::new(
            config.scheduler.clone(),
            calculator,
            engine,
            validator,
            manager.clone(),
            executor,
            cache.clone(),
            config.aggregation.keep_latest_metrics,
        )?);

        info!("🚀 PIPELINE: Components wired");

        Ok(Self {
            pool,
            cache,
            manager,
            scheduler,
        })
    }

    /// Run the scheduler loop until shutdown
    pub async fn run(&self) {
        self.scheduler.clone().run().await;
    }

    /// Stop the scheduler, drain active jobs, close the pool
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
        self.pool.close().await;
        info!("🚀 PIPELINE: Shut down");
    }

    pub fn scheduler(&self) -> &Arc<MetricsScheduler> {
        &self.scheduler
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            scheduler: self.scheduler.stats(),
            processing: self.manager.stats(),
            cache: self.cache.stats(),
            pool: self.pool.snapshot(),
        }
    }
}
