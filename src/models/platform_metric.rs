//! # Platform Metric Record
//!
//! Denormalized platform-wide rollup, one row per (calculation_date, period).
//! Every numeric field is a pure function of the tenant metric rows that were
//! fresh at computation time. Rows are upserted on their conflict key so
//! recomputation is idempotent.

use super::MetricPeriod;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Which MRR source fed the aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    /// Precise path: summed per-tenant platform_cost rows
    PlatformCostRows,
    /// Cold-start path: summed fixed subscription tier prices
    SubscriptionTierFallback,
}

impl CalculationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationMethod::PlatformCostRows => "platform_cost_rows",
            CalculationMethod::SubscriptionTierFallback => "subscription_tier_fallback",
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalculationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform_cost_rows" => Ok(CalculationMethod::PlatformCostRows),
            "subscription_tier_fallback" => Ok(CalculationMethod::SubscriptionTierFallback),
            other => Err(format!("unknown calculation method: {other}")),
        }
    }
}

/// One platform-wide rollup row for a (calculation_date, period) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformMetricRecord {
    pub calculation_date: NaiveDate,
    pub period: MetricPeriod,
    pub calculation_method: CalculationMethod,

    // Tenant population
    pub tenants_processed: i64,
    pub active_tenants: i64,

    // Primary sums from comprehensive rows
    pub platform_mrr: f64,
    pub total_revenue: f64,
    pub total_appointments: i64,
    pub total_chat_minutes: f64,
    pub total_new_customers: i64,
    pub total_sessions: i64,

    // Non-zero-only averages from comprehensive rows
    pub avg_appointment_success_rate: f64,
    pub avg_customer_satisfaction: f64,
    pub avg_ai_efficiency: f64,

    // Conversation billing
    pub total_billing_cost_usd: f64,
    pub total_billable_conversations: i64,
    pub avg_conversation_efficiency_pct: f64,
    pub avg_spam_rate_pct: f64,

    // Side-channel sums, used only for cross-checking
    pub validation_revenue: f64,
    pub validation_appointments: i64,

    // Derived ratios, computed strictly from the fields above
    pub revenue_to_mrr_ratio: f64,
    pub avg_revenue_per_tenant: f64,
    pub platform_utilization_score: f64,

    pub computed_at: DateTime<Utc>,
}

/// Raw platform_metrics row as stored
#[derive(Debug, Clone, FromRow)]
pub struct PlatformMetricRow {
    pub calculation_date: NaiveDate,
    pub period: String,
    pub calculation_method: String,
    pub tenants_processed: i64,
    pub active_tenants: i64,
    pub platform_mrr: f64,
    pub total_revenue: f64,
    pub total_appointments: i64,
    pub total_chat_minutes: f64,
    pub total_new_customers: i64,
    pub total_sessions: i64,
    pub avg_appointment_success_rate: f64,
    pub avg_customer_satisfaction: f64,
    pub avg_ai_efficiency: f64,
    pub total_billing_cost_usd: f64,
    pub total_billable_conversations: i64,
    pub avg_conversation_efficiency_pct: f64,
    pub avg_spam_rate_pct: f64,
    pub validation_revenue: f64,
    pub validation_appointments: i64,
    pub revenue_to_mrr_ratio: f64,
    pub avg_revenue_per_tenant: f64,
    pub platform_utilization_score: f64,
    pub computed_at: DateTime<Utc>,
}

impl TryFrom<PlatformMetricRow> for PlatformMetricRecord {
    type Error = String;

    fn try_from(row: PlatformMetricRow) -> Result<Self, Self::Error> {
        Ok(PlatformMetricRecord {
            calculation_date: row.calculation_date,
            period: row.period.parse()?,
            calculation_method: row.calculation_method.parse()?,
            tenants_processed: row.tenants_processed,
            active_tenants: row.active_tenants,
            platform_mrr: row.platform_mrr,
            total_revenue: row.total_revenue,
            total_appointments: row.total_appointments,
            total_chat_minutes: row.total_chat_minutes,
            total_new_customers: row.total_new_customers,
            total_sessions: row.total_sessions,
            avg_appointment_success_rate: row.avg_appointment_success_rate,
            avg_customer_satisfaction: row.avg_customer_satisfaction,
            avg_ai_efficiency: row.avg_ai_efficiency,
            total_billing_cost_usd: row.total_billing_cost_usd,
            total_billable_conversations: row.total_billable_conversations,
            avg_conversation_efficiency_pct: row.avg_conversation_efficiency_pct,
            avg_spam_rate_pct: row.avg_spam_rate_pct,
            validation_revenue: row.validation_revenue,
            validation_appointments: row.validation_appointments,
            revenue_to_mrr_ratio: row.revenue_to_mrr_ratio,
            avg_revenue_per_tenant: row.avg_revenue_per_tenant,
            platform_utilization_score: row.platform_utilization_score,
            computed_at: row.computed_at,
        })
    }
}
