//! # Tenant Metric Record
//!
//! The atomic output of a per-tenant computation: one JSONB payload per
//! (tenant, metric type, period). Payloads have a fixed schema per metric
//! type, modeled as a tagged union. Decoding is tolerant: unknown fields are
//! dropped with a warning and missing numeric fields default to zero, so a
//! schema drift in the store never fails a whole aggregation run.

use super::MetricPeriod;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

/// Closed set of metric categories, each with its own payload schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Comprehensive,
    PlatformCost,
    ConversationBilling,
    RevenueValidation,
}

impl MetricType {
    pub const ALL: [MetricType; 4] = [
        MetricType::Comprehensive,
        MetricType::PlatformCost,
        MetricType::ConversationBilling,
        MetricType::RevenueValidation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Comprehensive => "comprehensive",
            MetricType::PlatformCost => "platform_cost",
            MetricType::ConversationBilling => "conversation_billing",
            MetricType::RevenueValidation => "revenue_validation",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comprehensive" => Ok(MetricType::Comprehensive),
            "platform_cost" => Ok(MetricType::PlatformCost),
            "conversation_billing" => Ok(MetricType::ConversationBilling),
            "revenue_validation" => Ok(MetricType::RevenueValidation),
            other => Err(format!("unknown metric type: {other}")),
        }
    }
}

/// Primary per-tenant business metrics for one period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveMetrics {
    #[serde(default)]
    pub total_revenue: f64,
    #[serde(default)]
    pub total_appointments: i64,
    #[serde(default)]
    pub total_chat_minutes: f64,
    #[serde(default)]
    pub new_customers: i64,
    #[serde(default)]
    pub unique_sessions: i64,
    #[serde(default)]
    pub appointment_success_rate: f64,
    #[serde(default)]
    pub operational_efficiency_pct: f64,
    #[serde(default)]
    pub customer_satisfaction_score: f64,
    #[serde(default)]
    pub ai_assistant_efficiency: f64,
}

impl ComprehensiveMetrics {
    const KNOWN_FIELDS: &'static [&'static str] = &[
        "total_revenue",
        "total_appointments",
        "total_chat_minutes",
        "new_customers",
        "unique_sessions",
        "appointment_success_rate",
        "operational_efficiency_pct",
        "customer_satisfaction_score",
        "ai_assistant_efficiency",
    ];
}

/// What the tenant pays the platform this period
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformCostMetrics {
    #[serde(default)]
    pub platform_cost: f64,
}

impl PlatformCostMetrics {
    const KNOWN_FIELDS: &'static [&'static str] = &["platform_cost"];
}

/// Conversation billing costs in native currency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationBillingMetrics {
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub billable_conversations: i64,
    #[serde(default)]
    pub efficiency_pct: f64,
    #[serde(default)]
    pub spam_rate_pct: f64,
}

impl ConversationBillingMetrics {
    const KNOWN_FIELDS: &'static [&'static str] = &[
        "total_cost_usd",
        "billable_conversations",
        "efficiency_pct",
        "spam_rate_pct",
    ];
}

/// Independently sourced revenue figures, used only for cross-checking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueValidationMetrics {
    #[serde(default)]
    pub total_revenue: f64,
    #[serde(default)]
    pub total_appointments: i64,
    #[serde(default)]
    pub unique_customers: i64,
}

impl RevenueValidationMetrics {
    const KNOWN_FIELDS: &'static [&'static str] =
        &["total_revenue", "total_appointments", "unique_customers"];
}

/// Tagged payload union keyed by metric type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetricPayload {
    Comprehensive(ComprehensiveMetrics),
    PlatformCost(PlatformCostMetrics),
    ConversationBilling(ConversationBillingMetrics),
    RevenueValidation(RevenueValidationMetrics),
}

impl MetricPayload {
    pub fn metric_type(&self) -> MetricType {
        match self {
            MetricPayload::Comprehensive(_) => MetricType::Comprehensive,
            MetricPayload::PlatformCost(_) => MetricType::PlatformCost,
            MetricPayload::ConversationBilling(_) => MetricType::ConversationBilling,
            MetricPayload::RevenueValidation(_) => MetricType::RevenueValidation,
        }
    }

    /// Decode a JSONB payload for the given metric type. Unknown fields are
    /// dropped with a warning; missing fields default to zero.
    pub fn from_value(metric_type: MetricType, value: &Value) -> Result<Self, serde_json::Error> {
        let known = match metric_type {
            MetricType::Comprehensive => ComprehensiveMetrics::KNOWN_FIELDS,
            MetricType::PlatformCost => PlatformCostMetrics::KNOWN_FIELDS,
            MetricType::ConversationBilling => ConversationBillingMetrics::KNOWN_FIELDS,
            MetricType::RevenueValidation => RevenueValidationMetrics::KNOWN_FIELDS,
        };
        warn_unknown_fields(metric_type, value, known);

        match metric_type {
            MetricType::Comprehensive => {
                serde_json::from_value(value.clone()).map(MetricPayload::Comprehensive)
            }
            MetricType::PlatformCost => {
                serde_json::from_value(value.clone()).map(MetricPayload::PlatformCost)
            }
            MetricType::ConversationBilling => {
                serde_json::from_value(value.clone()).map(MetricPayload::ConversationBilling)
            }
            MetricType::RevenueValidation => {
                serde_json::from_value(value.clone()).map(MetricPayload::RevenueValidation)
            }
        }
    }
}

fn warn_unknown_fields(metric_type: MetricType, value: &Value, known: &[&str]) {
    if let Value::Object(map) = value {
        for key in map.keys() {
            if !known.contains(&key.as_str()) {
                warn!(
                    metric_type = %metric_type,
                    field = %key,
                    "Dropping unknown payload field"
                );
            }
        }
    }
}

/// One computed metric row for a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantMetricRecord {
    pub tenant_id: Uuid,
    pub metric_type: MetricType,
    pub period: MetricPeriod,
    pub payload: MetricPayload,
    pub computed_at: DateTime<Utc>,
}

impl TenantMetricRecord {
    pub fn new(
        tenant_id: Uuid,
        period: MetricPeriod,
        payload: MetricPayload,
        computed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            metric_type: payload.metric_type(),
            period,
            payload,
            computed_at,
        }
    }
}

/// Raw tenant_metrics row as stored
#[derive(Debug, Clone, FromRow)]
pub struct TenantMetricRow {
    pub tenant_id: Uuid,
    pub metric_type: String,
    pub period: String,
    pub metric_data: Value,
    pub calculated_at: DateTime<Utc>,
}

impl TenantMetricRow {
    /// Decode into a typed record. Rows with a metric type outside the closed
    /// set, or with an undecodable payload, are skipped with a warning rather
    /// than failing the batch.
    pub fn decode(self) -> Option<TenantMetricRecord> {
        let metric_type: MetricType = match self.metric_type.parse() {
            Ok(t) => t,
            Err(_) => {
                warn!(
                    tenant_id = %self.tenant_id,
                    metric_type = %self.metric_type,
                    "Skipping row with unrecognized metric type"
                );
                return None;
            }
        };
        let period: MetricPeriod = match self.period.parse() {
            Ok(p) => p,
            Err(_) => {
                warn!(
                    tenant_id = %self.tenant_id,
                    period = %self.period,
                    "Skipping row with unrecognized period"
                );
                return None;
            }
        };
        match MetricPayload::from_value(metric_type, &self.metric_data) {
            Ok(payload) => Some(TenantMetricRecord {
                tenant_id: self.tenant_id,
                metric_type,
                period,
                payload,
                computed_at: self.calculated_at,
            }),
            Err(err) => {
                warn!(
                    tenant_id = %self.tenant_id,
                    metric_type = %metric_type,
                    error = %err,
                    "Skipping row with undecodable payload"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_default_to_zero() {
        let payload = MetricPayload::from_value(
            MetricType::Comprehensive,
            &json!({ "total_revenue": 1250.50 }),
        )
        .unwrap();
        match payload {
            MetricPayload::Comprehensive(metrics) => {
                assert_eq!(metrics.total_revenue, 1250.50);
                assert_eq!(metrics.total_appointments, 0);
                assert_eq!(metrics.appointment_success_rate, 0.0);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_fields_are_dropped_not_fatal() {
        let payload = MetricPayload::from_value(
            MetricType::ConversationBilling,
            &json!({
                "total_cost_usd": 4.2,
                "billable_conversations": 17,
                "some_future_field": { "nested": true }
            }),
        )
        .unwrap();
        match payload {
            MetricPayload::ConversationBilling(metrics) => {
                assert_eq!(metrics.billable_conversations, 17);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_metric_type_row_is_skipped() {
        let row = TenantMetricRow {
            tenant_id: Uuid::new_v4(),
            metric_type: "participation".to_string(),
            period: "30d".to_string(),
            metric_data: json!({}),
            calculated_at: Utc::now(),
        };
        assert!(row.decode().is_none());
    }

    #[test]
    fn test_well_formed_row_decodes() {
        let tenant_id = Uuid::new_v4();
        let row = TenantMetricRow {
            tenant_id,
            metric_type: "platform_cost".to_string(),
            period: "7d".to_string(),
            metric_data: json!({ "platform_cost": 58.0 }),
            calculated_at: Utc::now(),
        };
        let record = row.decode().unwrap();
        assert_eq!(record.tenant_id, tenant_id);
        assert_eq!(record.metric_type, MetricType::PlatformCost);
        assert_eq!(record.period, MetricPeriod::SevenDays);
        assert_eq!(
            record.payload,
            MetricPayload::PlatformCost(PlatformCostMetrics { platform_cost: 58.0 })
        );
    }
}
