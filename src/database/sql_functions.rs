//! # SQL Function Execution
//!
//! Thin typed wrappers around the stored routine and the metric stores. The
//! expensive per-tenant business math lives inside
//! `calculate_tenant_metrics()` in the database; this module only invokes it
//! and moves typed rows in and out.

use crate::error::{PipelineError, Result};
use crate::models::{
    BulkComputationSummary, MetricPeriod, MetricType, PlatformMetricRecord, PlatformMetricRow,
    Tenant, TenantMetricRecord, TenantMetricRow, TenantRow,
};
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

/// Executor for the pipeline's SQL functions and stores
#[derive(Clone)]
pub struct SqlFunctionExecutor {
    pool: PgPool,
}

impl SqlFunctionExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Invoke the bulk computation routine. One call produces metric rows for
    /// every enumerated period; `tenant_id = None` means all active tenants.
    pub async fn compute_metrics(
        &self,
        calculation_date: NaiveDate,
        tenant_id: Option<Uuid>,
    ) -> Result<BulkComputationSummary> {
        let summary = sqlx::query_as::<_, BulkComputationSummary>(
            r#"
            SELECT success, processed_tenants, periods_processed,
                   metrics_created, execution_time_ms
            FROM calculate_tenant_metrics($1::date, $2::uuid)
            "#,
        )
        .bind(calculation_date)
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        info!(
            calculation_date = %calculation_date,
            tenant_id = ?tenant_id,
            processed_tenants = summary.processed_tenants,
            metrics_created = summary.metrics_created,
            execution_time_ms = summary.execution_time_ms,
            "📊 BULK COMPUTE: Stored routine completed"
        );

        Ok(summary)
    }

    /// All tenants currently in active status
    pub async fn active_tenants(&self) -> Result<Vec<Tenant>> {
        let rows = sqlx::query_as::<_, TenantRow>(
            r#"
            SELECT id, business_name, status, subscription_plan
            FROM tenants
            WHERE status = 'active'
            ORDER BY business_name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Tenant::from).collect())
    }

    /// Latest metric row per tenant for one (metric type, period) pair.
    /// Undecodable rows are skipped with a warning, not errors.
    pub async fn tenant_metrics(
        &self,
        metric_type: MetricType,
        period: MetricPeriod,
    ) -> Result<Vec<TenantMetricRecord>> {
        let rows = sqlx::query_as::<_, TenantMetricRow>(
            r#"
            SELECT DISTINCT ON (tenant_id)
                   tenant_id, metric_type, period, metric_data, calculated_at
            FROM tenant_metrics
            WHERE metric_type = $1 AND period = $2
            ORDER BY tenant_id, calculated_at DESC
            "#,
        )
        .bind(metric_type.as_str())
        .bind(period.as_str())
        .fetch_all(&self.pool)
        .await?;

        let fetched = rows.len();
        let records: Vec<TenantMetricRecord> =
            rows.into_iter().filter_map(TenantMetricRow::decode).collect();

        debug!(
            metric_type = %metric_type,
            period = %period,
            fetched,
            decoded = records.len(),
            "Fetched tenant metric rows"
        );

        Ok(records)
    }

    /// Upsert one platform rollup row, keyed on (calculation_date, period)
    pub async fn upsert_platform_metrics(&self, record: &PlatformMetricRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_metrics (
                calculation_date, period, calculation_method,
                tenants_processed, active_tenants,
                platform_mrr, total_revenue, total_appointments,
                total_chat_minutes, total_new_customers, total_sessions,
                avg_appointment_success_rate, avg_customer_satisfaction,
                avg_ai_efficiency,
                total_billing_cost_usd, total_billable_conversations,
                avg_conversation_efficiency_pct, avg_spam_rate_pct,
                validation_revenue, validation_appointments,
                revenue_to_mrr_ratio, avg_revenue_per_tenant,
                platform_utilization_score, computed_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            ON CONFLICT (calculation_date, period) DO UPDATE SET
                calculation_method = EXCLUDED.calculation_method,
                tenants_processed = EXCLUDED.tenants_processed,
                active_tenants = EXCLUDED.active_tenants,
                platform_mrr = EXCLUDED.platform_mrr,
                total_revenue = EXCLUDED.total_revenue,
                total_appointments = EXCLUDED.total_appointments,
                total_chat_minutes = EXCLUDED.total_chat_minutes,
                total_new_customers = EXCLUDED.total_new_customers,
                total_sessions = EXCLUDED.total_sessions,
                avg_appointment_success_rate = EXCLUDED.avg_appointment_success_rate,
                avg_customer_satisfaction = EXCLUDED.avg_customer_satisfaction,
                avg_ai_efficiency = EXCLUDED.avg_ai_efficiency,
                total_billing_cost_usd = EXCLUDED.total_billing_cost_usd,
                total_billable_conversations = EXCLUDED.total_billable_conversations,
                avg_conversation_efficiency_pct = EXCLUDED.avg_conversation_efficiency_pct,
                avg_spam_rate_pct = EXCLUDED.avg_spam_rate_pct,
                validation_revenue = EXCLUDED.validation_revenue,
                validation_appointments = EXCLUDED.validation_appointments,
                revenue_to_mrr_ratio = EXCLUDED.revenue_to_mrr_ratio,
                avg_revenue_per_tenant = EXCLUDED.avg_revenue_per_tenant,
                platform_utilization_score = EXCLUDED.platform_utilization_score,
                computed_at = EXCLUDED.computed_at
            "#,
        )
        .bind(record.calculation_date)
        .bind(record.period.as_str())
        .bind(record.calculation_method.as_str())
        .bind(record.tenants_processed)
        .bind(record.active_tenants)
        .bind(record.platform_mrr)
        .bind(record.total_revenue)
        .bind(record.total_appointments)
        .bind(record.total_chat_minutes)
        .bind(record.total_new_customers)
        .bind(record.total_sessions)
        .bind(record.avg_appointment_success_rate)
        .bind(record.avg_customer_satisfaction)
        .bind(record.avg_ai_efficiency)
        .bind(record.total_billing_cost_usd)
        .bind(record.total_billable_conversations)
        .bind(record.avg_conversation_efficiency_pct)
        .bind(record.avg_spam_rate_pct)
        .bind(record.validation_revenue)
        .bind(record.validation_appointments)
        .bind(record.revenue_to_mrr_ratio)
        .bind(record.avg_revenue_per_tenant)
        .bind(record.platform_utilization_score)
        .bind(record.computed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent platform rollup for a period, if one exists
    pub async fn latest_platform_metrics(
        &self,
        period: MetricPeriod,
    ) -> Result<Option<PlatformMetricRecord>> {
        let row = sqlx::query_as::<_, PlatformMetricRow>(
            r#"
            SELECT calculation_date, period, calculation_method,
                   tenants_processed, active_tenants,
                   platform_mrr, total_revenue, total_appointments,
                   total_chat_minutes, total_new_customers, total_sessions,
                   avg_appointment_success_rate, avg_customer_satisfaction,
                   avg_ai_efficiency,
                   total_billing_cost_usd, total_billable_conversations,
                   avg_conversation_efficiency_pct, avg_spam_rate_pct,
                   validation_revenue, validation_appointments,
                   revenue_to_mrr_ratio, avg_revenue_per_tenant,
                   platform_utilization_score, computed_at
            FROM platform_metrics
            WHERE period = $1
            ORDER BY calculation_date DESC
            LIMIT 1
            "#,
        )
        .bind(period.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            PlatformMetricRecord::try_from(r).map_err(|e| {
                PipelineError::Aggregation(format!("stored platform row invalid: {e}"))
            })
        })
        .transpose()
    }

    /// Delete superseded tenant metric rows, keeping the latest N per
    /// (tenant, metric type, period). Returns the number of rows removed.
    pub async fn prune_superseded_metrics(&self, keep_latest: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM tenant_metrics t
            USING (
                SELECT ctid,
                       ROW_NUMBER() OVER (
                           PARTITION BY tenant_id, metric_type, period
                           ORDER BY calculated_at DESC
                       ) AS rank
                FROM tenant_metrics
            ) ranked
            WHERE t.ctid = ranked.ctid AND ranked.rank > $1
            "#,
        )
        .bind(keep_latest)
        .execute(&self.pool)
        .await?;

        let pruned = result.rows_affected();
        if pruned > 0 {
            info!(pruned, keep_latest, "🧹 PRUNE: Removed superseded metric rows");
        }
        Ok(pruned)
    }
}
