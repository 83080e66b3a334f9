//! # Per-Tenant Metrics Calculator
//!
//! Orchestration and validation wrapper around the bulk computation routine.
//! One invocation produces metric rows for every enumerated period in a
//! single pass; historically each period was computed with a separate call,
//! and consolidating them cuts invocations by 3x for the same tenant set.
//! Row-by-row application-level computation across thousands of tenants is
//! too slow and too chatty for the connection pool, so no business-metric
//! math happens here.

use crate::cache::MetricsCache;
use crate::config::CacheConfig;
use crate::database::SqlFunctionExecutor;
use crate::error::{PipelineError, Result};
use crate::models::{BulkComputationSummary, Tenant};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const ACTIVE_TENANTS_KEY: &str = "tenants:active";

pub struct TenantMetricsCalculator {
    executor: SqlFunctionExecutor,
    cache: Arc<MetricsCache>,
    cache_config: CacheConfig,
}

impl TenantMetricsCalculator {
    pub fn new(
        executor: SqlFunctionExecutor,
        cache: Arc<MetricsCache>,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            executor,
            cache,
            cache_config,
        }
    }

    /// Run the bulk computation for one date. `tenant_id = None` covers all
    /// active tenants in a single call. Returns the validated summary for the
    /// scheduler to log.
    pub async fn calculate(
        &self,
        calculation_date: NaiveDate,
        tenant_id: Option<Uuid>,
    ) -> Result<BulkComputationSummary> {
        let expected_tenants = match tenant_id {
            Some(_) => 1,
            None => self.active_tenants().await?.len() as i64,
        };

        let summary = self
            .executor
            .compute_metrics(calculation_date, tenant_id)
            .await?;

        Self::validate_summary(&summary, expected_tenants)?;

        info!(
            calculation_date = %calculation_date,
            processed_tenants = summary.processed_tenants,
            metrics_created = summary.metrics_created,
            execution_time_ms = summary.execution_time_ms,
            "🧮 CALCULATOR: Bulk computation validated"
        );

        Ok(summary)
    }

    /// Check the summary against the expected tenant population. Only an
    /// outright routine failure is an error; shortfalls are logged so the
    /// validator can pick them up as discrepancy candidates.
    pub fn validate_summary(
        summary: &BulkComputationSummary,
        expected_tenants: i64,
    ) -> Result<()> {
        if !summary.success {
            return Err(PipelineError::Validation(
                "bulk computation routine reported failure".to_string(),
            ));
        }
        if summary.processed_tenants < expected_tenants {
            warn!(
                processed = summary.processed_tenants,
                expected = expected_tenants,
                "Bulk computation processed fewer tenants than expected"
            );
        }
        if summary.metrics_created < summary.expected_metrics() {
            warn!(
                metrics_created = summary.metrics_created,
                expected = summary.expected_metrics(),
                "Bulk computation created fewer metric rows than expected"
            );
        }
        Ok(())
    }

    /// Active tenant list, cached with a short TTL. A cache miss or an
    /// unavailable cache falls through to the store.
    pub async fn active_tenants(&self) -> Result<Vec<Tenant>> {
        if let Some(tenants) = self.cache.get::<Vec<Tenant>>(ACTIVE_TENANTS_KEY) {
            return Ok(tenants);
        }
        let tenants = self.executor.active_tenants().await?;
        self.cache.set(
            ACTIVE_TENANTS_KEY,
            &tenants,
            self.cache_config.active_tenants.ttl_duration(),
        );
        Ok(tenants)
    }

    /// Drop the cached tenant list, forcing the next read to hit the store
    pub fn invalidate_tenant_cache(&self) {
        self.cache.delete_pattern(ACTIVE_TENANTS_KEY);
    }
}
