//! # Domain Models
//!
//! Typed representations of the rows the pipeline reads and writes: tenants,
//! per-tenant metric records with their tagged payloads, platform rollups, and
//! the bulk computation summary. Raw `*Row` structs mirror storage exactly;
//! conversion into the typed forms is tolerant of drift.

pub mod computation_summary;
pub mod metric_period;
pub mod platform_metric;
pub mod tenant;
pub mod tenant_metric;

pub use computation_summary::BulkComputationSummary;
pub use metric_period::MetricPeriod;
pub use platform_metric::{CalculationMethod, PlatformMetricRecord, PlatformMetricRow};
pub use tenant::{SubscriptionTier, Tenant, TenantRow, TenantStatus};
pub use tenant_metric::{
    ComprehensiveMetrics, ConversationBillingMetrics, MetricPayload, MetricType,
    PlatformCostMetrics, RevenueValidationMetrics, TenantMetricRecord, TenantMetricRow,
};
