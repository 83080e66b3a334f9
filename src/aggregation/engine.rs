//! # Platform Aggregation Engine
//!
//! Produces one platform rollup per period from the full set of fresh tenant
//! metric rows. The numeric work is a pure fold over in-memory rows
//! ([`aggregate_rows`]); persistence and caching wrap it. Re-running the fold
//! over unchanged inputs yields byte-identical numeric fields, and the upsert
//! key (calculation_date, period) makes recomputation idempotent end to end.
//!
//! ## MRR source
//!
//! The MRR source is selected up front per run as a named strategy, never as
//! an inline conditional inside the math: `PlatformCostRows` when at least
//! one platform_cost row exists, otherwise `SubscriptionTierFallback` summing
//! each active tenant's fixed tier price. The chosen strategy is tagged on
//! the output so downstream consumers can tell the precise path from the
//! cold-start path.

use crate::cache::MetricsCache;
use crate::config::{AggregationConfig, CacheConfig};
use crate::database::SqlFunctionExecutor;
use crate::error::{PipelineError, Result};
use crate::models::{
    CalculationMethod, MetricPayload, MetricPeriod, MetricType, PlatformMetricRecord, Tenant,
    TenantMetricRecord,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Pick the MRR strategy for a run: precise when any platform_cost row
/// exists, tier-price fallback otherwise
pub fn select_calculation_method(rows: &[TenantMetricRecord]) -> CalculationMethod {
    let has_cost_rows = rows
        .iter()
        .any(|r| r.metric_type == MetricType::PlatformCost);
    if has_cost_rows {
        CalculationMethod::PlatformCostRows
    } else {
        CalculationMethod::SubscriptionTierFallback
    }
}

/// Pure fold from tenant metric rows to one platform rollup. Reads nothing
/// but its arguments; every output field is a function of the inputs.
pub fn aggregate_rows(
    rows: &[TenantMetricRecord],
    active_tenants: &[Tenant],
    period: MetricPeriod,
    calculation_date: NaiveDate,
    method: CalculationMethod,
    config: &AggregationConfig,
    computed_at: DateTime<Utc>,
) -> PlatformMetricRecord {
    let mut tenants_seen: HashSet<Uuid> = HashSet::new();
    let mut tenants_with_appointments: HashSet<Uuid> = HashSet::new();

    let mut cost_mrr = 0.0f64;
    let mut total_revenue = 0.0f64;
    let mut total_appointments = 0i64;
    let mut total_chat_minutes = 0.0f64;
    let mut total_new_customers = 0i64;
    let mut total_sessions = 0i64;

    // Averages over tenants that reported a non-zero value, so absent data
    // does not dilute them
    let mut success_rates: Vec<f64> = Vec::new();
    let mut satisfactions: Vec<f64> = Vec::new();
    let mut ai_efficiencies: Vec<f64> = Vec::new();

    let mut total_billing_cost_usd = 0.0f64;
    let mut total_billable_conversations = 0i64;
    let mut billing_efficiencies: Vec<f64> = Vec::new();
    let mut spam_rates: Vec<f64> = Vec::new();

    let mut validation_revenue = 0.0f64;
    let mut validation_appointments = 0i64;

    for row in rows {
        if row.period != period {
            continue;
        }
        tenants_seen.insert(row.tenant_id);

        match &row.payload {
            MetricPayload::Comprehensive(m) => {
                total_revenue += m.total_revenue;
                total_appointments += m.total_appointments;
                total_chat_minutes += m.total_chat_minutes;
                total_new_customers += m.new_customers;
                total_sessions += m.unique_sessions;
                if m.total_appointments > 0 {
                    tenants_with_appointments.insert(row.tenant_id);
                }
                if m.appointment_success_rate != 0.0 {
                    success_rates.push(m.appointment_success_rate);
                }
                if m.customer_satisfaction_score != 0.0 {
                    satisfactions.push(m.customer_satisfaction_score);
                }
                if m.ai_assistant_efficiency != 0.0 {
                    ai_efficiencies.push(m.ai_assistant_efficiency);
                }
            }
            MetricPayload::PlatformCost(m) => {
                cost_mrr += m.platform_cost;
            }
            MetricPayload::ConversationBilling(m) => {
                total_billing_cost_usd += m.total_cost_usd;
                total_billable_conversations += m.billable_conversations;
                if m.efficiency_pct != 0.0 {
                    billing_efficiencies.push(m.efficiency_pct);
                }
                // Zero spam is real data, not absent data; it stays in
                spam_rates.push(m.spam_rate_pct);
            }
            MetricPayload::RevenueValidation(m) => {
                validation_revenue += m.total_revenue;
                validation_appointments += m.total_appointments;
            }
        }
    }

    let platform_mrr = match method {
        CalculationMethod::PlatformCostRows => cost_mrr,
        CalculationMethod::SubscriptionTierFallback => active_tenants
            .iter()
            .map(|t| t.subscription_tier.monthly_price(&config.plan_prices))
            .sum(),
    };

    let avg_appointment_success_rate = mean(&success_rates);
    let avg_customer_satisfaction = mean(&satisfactions);
    let avg_ai_efficiency = mean(&ai_efficiencies);
    let avg_conversation_efficiency_pct = mean(&billing_efficiencies);
    let avg_spam_rate_pct = mean(&spam_rates);

    // Derived ratios read only the sums and averages above, never raw rows
    let active_count = tenants_with_appointments.len() as i64;
    let revenue_to_mrr_ratio = if platform_mrr != 0.0 {
        total_revenue / platform_mrr
    } else {
        0.0
    };
    let avg_revenue_per_tenant = if active_count > 0 {
        total_revenue / active_count as f64
    } else {
        0.0
    };
    let w = &config.utilization_weights;
    let platform_utilization_score = avg_appointment_success_rate * w.success_rate
        + avg_customer_satisfaction * w.satisfaction
        + avg_ai_efficiency * w.ai_efficiency
        + (100.0 - avg_spam_rate_pct) * w.inverse_spam;

    PlatformMetricRecord {
        calculation_date,
        period,
        calculation_method: method,
        tenants_processed: tenants_seen.len() as i64,
        active_tenants: active_count,
        platform_mrr,
        total_revenue,
        total_appointments,
        total_chat_minutes,
        total_new_customers,
        total_sessions,
        avg_appointment_success_rate,
        avg_customer_satisfaction,
        avg_ai_efficiency,
        total_billing_cost_usd,
        total_billable_conversations,
        avg_conversation_efficiency_pct,
        avg_spam_rate_pct,
        validation_revenue,
        validation_appointments,
        revenue_to_mrr_ratio,
        avg_revenue_per_tenant,
        platform_utilization_score,
        computed_at,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Outcome of a multi-period aggregation pass. Per-period failures never
/// abort the sibling periods.
#[derive(Debug)]
pub struct AggregationRunReport {
    pub records: Vec<PlatformMetricRecord>,
    pub failures: Vec<(MetricPeriod, PipelineError)>,
}

impl AggregationRunReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct PlatformAggregationEngine {
    executor: SqlFunctionExecutor,
    cache: Arc<MetricsCache>,
    config: AggregationConfig,
    cache_config: CacheConfig,
}

impl PlatformAggregationEngine {
    pub fn new(
        executor: SqlFunctionExecutor,
        cache: Arc<MetricsCache>,
        config: AggregationConfig,
        cache_config: CacheConfig,
    ) -> Self {
        Self {
            executor,
            cache,
            config,
            cache_config,
        }
    }

    fn totals_cache_key(period: MetricPeriod) -> String {
        format!("platform:totals:{period}")
    }

    /// Fetch fresh rows for one period, fold, upsert, cache
    pub async fn aggregate_period(
        &self,
        period: MetricPeriod,
        calculation_date: NaiveDate,
    ) -> Result<PlatformMetricRecord> {
        let rows = self.fetch_period_rows(period).await?;
        let active_tenants = self.executor.active_tenants().await?;
        let method = select_calculation_method(&rows);

        let record = aggregate_rows(
            &rows,
            &active_tenants,
            period,
            calculation_date,
            method,
            &self.config,
            Utc::now(),
        );

        self.executor.upsert_platform_metrics(&record).await?;
        self.cache.set(
            &Self::totals_cache_key(period),
            &record,
            self.cache_config.platform_totals.ttl_duration(),
        );

        info!(
            period = %period,
            calculation_date = %calculation_date,
            calculation_method = %method,
            tenants_processed = record.tenants_processed,
            platform_mrr = record.platform_mrr,
            total_revenue = record.total_revenue,
            "📈 AGGREGATION: Platform rollup persisted"
        );

        Ok(record)
    }

    /// Aggregate every enumerated period. A failing period is reported and
    /// the remaining periods still run.
    pub async fn aggregate_all_periods(&self, calculation_date: NaiveDate) -> AggregationRunReport {
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for period in MetricPeriod::ALL {
            match self.aggregate_period(period, calculation_date).await {
                Ok(record) => records.push(record),
                Err(err) => {
                    error!(period = %period, error = %err, "Period aggregation failed");
                    failures.push((period, err));
                }
            }
        }

        AggregationRunReport { records, failures }
    }

    /// Cached rollup for a period, if a fresh one is in the cache
    pub fn cached_totals(&self, period: MetricPeriod) -> Option<PlatformMetricRecord> {
        self.cache.get(&Self::totals_cache_key(period))
    }

    /// Bust all cached platform totals, forcing re-reads after a config change
    pub fn invalidate_totals_cache(&self) {
        self.cache.delete_pattern("platform:totals:*");
    }

    async fn fetch_period_rows(&self, period: MetricPeriod) -> Result<Vec<TenantMetricRecord>> {
        let mut rows = Vec::new();
        for metric_type in MetricType::ALL {
            rows.extend(self.executor.tenant_metrics(metric_type, period).await?);
        }
        Ok(rows)
    }
}
