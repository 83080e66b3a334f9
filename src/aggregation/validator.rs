//! # Consistency Validator
//!
//! Audit pass over the persisted platform rollups. Recomputes the fold from
//! fresh tenant rows, diffs the headline fields against what is stored, and
//! reports discrepancies. Runs on demand or on a low-frequency schedule, and
//! never auto-corrects: the persisted aggregate is left untouched and an
//! operator decides what to do with the report.

use super::engine::{aggregate_rows, select_calculation_method};
use crate::config::AggregationConfig;
use crate::database::SqlFunctionExecutor;
use crate::error::Result;
use crate::models::{MetricPeriod, MetricType, PlatformMetricRecord, TenantMetricRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Relative tolerance on headline fields
pub const RELATIVE_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Discrepancy {
    /// No persisted rollup exists for the period at all
    MissingRecord { period: MetricPeriod },
    FieldMismatch {
        field: String,
        persisted: f64,
        recomputed: f64,
        relative_delta: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub period: MetricPeriod,
    pub checked_at: DateTime<Utc>,
    pub discrepancies: Vec<Discrepancy>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Relative difference between persisted and recomputed, scaled to the larger
/// magnitude; both-zero is a perfect match
pub fn relative_delta(persisted: f64, recomputed: f64) -> f64 {
    let scale = persisted.abs().max(recomputed.abs());
    if scale == 0.0 {
        0.0
    } else {
        (persisted - recomputed).abs() / scale
    }
}

/// Diff the headline fields of two rollups within the given tolerance
pub fn diff_records(
    persisted: &PlatformMetricRecord,
    recomputed: &PlatformMetricRecord,
    tolerance: f64,
) -> Vec<Discrepancy> {
    let headline = [
        ("platform_mrr", persisted.platform_mrr, recomputed.platform_mrr),
        (
            "total_revenue",
            persisted.total_revenue,
            recomputed.total_revenue,
        ),
        (
            "total_appointments",
            persisted.total_appointments as f64,
            recomputed.total_appointments as f64,
        ),
        (
            "total_billable_conversations",
            persisted.total_billable_conversations as f64,
            recomputed.total_billable_conversations as f64,
        ),
    ];

    headline
        .into_iter()
        .filter_map(|(field, p, r)| {
            let delta = relative_delta(p, r);
            if delta > tolerance {
                Some(Discrepancy::FieldMismatch {
                    field: field.to_string(),
                    persisted: p,
                    recomputed: r,
                    relative_delta: delta,
                })
            } else {
                None
            }
        })
        .collect()
}

pub struct ConsistencyValidator {
    executor: SqlFunctionExecutor,
    config: AggregationConfig,
}

impl ConsistencyValidator {
    pub fn new(executor: SqlFunctionExecutor, config: AggregationConfig) -> Self {
        Self { executor, config }
    }

    /// Recompute the rollup for one period from fresh rows and diff it
    /// against the persisted record
    pub async fn validate(&self, period: MetricPeriod) -> Result<ConsistencyReport> {
        let checked_at = Utc::now();

        let persisted = match self.executor.latest_platform_metrics(period).await? {
            Some(record) => record,
            None => {
                warn!(period = %period, "No persisted platform rollup to validate");
                return Ok(ConsistencyReport {
                    period,
                    checked_at,
                    discrepancies: vec![Discrepancy::MissingRecord { period }],
                });
            }
        };

        let mut rows: Vec<TenantMetricRecord> = Vec::new();
        for metric_type in MetricType::ALL {
            rows.extend(self.executor.tenant_metrics(metric_type, period).await?);
        }
        let active_tenants = self.executor.active_tenants().await?;
        let method = select_calculation_method(&rows);

        let recomputed = aggregate_rows(
            &rows,
            &active_tenants,
            period,
            persisted.calculation_date,
            method,
            &self.config,
            checked_at,
        );

        let discrepancies = diff_records(&persisted, &recomputed, RELATIVE_TOLERANCE);
        if discrepancies.is_empty() {
            info!(period = %period, "✅ VALIDATOR: Platform rollup consistent");
        } else {
            warn!(
                period = %period,
                count = discrepancies.len(),
                discrepancies = ?discrepancies,
                "⚠️ VALIDATOR: Platform rollup discrepancies found"
            );
        }

        Ok(ConsistencyReport {
            period,
            checked_at,
            discrepancies,
        })
    }

    /// Validate every enumerated period
    pub async fn validate_all(&self) -> Result<Vec<ConsistencyReport>> {
        let mut reports = Vec::new();
        for period in MetricPeriod::ALL {
            reports.push(self.validate(period).await?);
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalculationMethod;
    use chrono::NaiveDate;

    fn record(mrr: f64, revenue: f64, appointments: i64) -> PlatformMetricRecord {
        PlatformMetricRecord {
            calculation_date: NaiveDate::from_ymd_opt(2025, 8, 30).unwrap(),
            period: MetricPeriod::ThirtyDays,
            calculation_method: CalculationMethod::PlatformCostRows,
            tenants_processed: 10,
            active_tenants: 8,
            platform_mrr: mrr,
            total_revenue: revenue,
            total_appointments: appointments,
            total_chat_minutes: 0.0,
            total_new_customers: 0,
            total_sessions: 0,
            avg_appointment_success_rate: 0.0,
            avg_customer_satisfaction: 0.0,
            avg_ai_efficiency: 0.0,
            total_billing_cost_usd: 0.0,
            total_billable_conversations: 100,
            avg_conversation_efficiency_pct: 0.0,
            avg_spam_rate_pct: 0.0,
            validation_revenue: 0.0,
            validation_appointments: 0,
            revenue_to_mrr_ratio: 0.0,
            avg_revenue_per_tenant: 0.0,
            platform_utilization_score: 0.0,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_identical_records_are_consistent() {
        let a = record(1000.0, 5000.0, 320);
        let b = record(1000.0, 5000.0, 320);
        assert!(diff_records(&a, &b, RELATIVE_TOLERANCE).is_empty());
    }

    #[test]
    fn test_within_tolerance_passes() {
        // 0.5% drift on MRR stays under the 1% tolerance
        let a = record(1000.0, 5000.0, 320);
        let b = record(1005.0, 5000.0, 320);
        assert!(diff_records(&a, &b, RELATIVE_TOLERANCE).is_empty());
    }

    #[test]
    fn test_drift_beyond_tolerance_is_reported() {
        let a = record(1000.0, 5000.0, 320);
        let b = record(1100.0, 5000.0, 320);
        let discrepancies = diff_records(&a, &b, RELATIVE_TOLERANCE);
        assert_eq!(discrepancies.len(), 1);
        match &discrepancies[0] {
            Discrepancy::FieldMismatch { field, .. } => assert_eq!(field, "platform_mrr"),
            other => panic!("unexpected discrepancy: {other:?}"),
        }
    }

    #[test]
    fn test_zero_against_zero_matches() {
        assert_eq!(relative_delta(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_zero_against_nonzero_is_full_delta() {
        assert_eq!(relative_delta(0.0, 50.0), 1.0);
    }
}
