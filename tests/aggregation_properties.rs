//! Property-style tests for the platform aggregation fold and the
//! consistency validator, run entirely over in-memory rows.

use chrono::{NaiveDate, TimeZone, Utc};
use tenant_metrics_core::aggregation::{aggregate_rows, diff_records, select_calculation_method};
use tenant_metrics_core::config::AggregationConfig;
use tenant_metrics_core::models::{
    CalculationMethod, ComprehensiveMetrics, ConversationBillingMetrics, MetricPayload,
    MetricPeriod, PlatformCostMetrics, SubscriptionTier, Tenant, TenantMetricRecord,
    TenantMetricRow, TenantStatus,
};
use uuid::Uuid;

fn calc_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 30).unwrap()
}

fn active_tenant(tier: SubscriptionTier) -> Tenant {
    Tenant {
        id: Uuid::new_v4(),
        business_name: format!("tenant-{}", Uuid::new_v4()),
        status: TenantStatus::Active,
        subscription_tier: tier,
    }
}

fn comprehensive(metrics: ComprehensiveMetrics) -> TenantMetricRecord {
    TenantMetricRecord::new(
        Uuid::new_v4(),
        MetricPeriod::ThirtyDays,
        MetricPayload::Comprehensive(metrics),
        Utc::now(),
    )
}

fn sample_rows() -> Vec<TenantMetricRecord> {
    vec![
        comprehensive(ComprehensiveMetrics {
            total_revenue: 1200.0,
            total_appointments: 30,
            total_chat_minutes: 420.0,
            new_customers: 5,
            unique_sessions: 80,
            appointment_success_rate: 92.0,
            customer_satisfaction_score: 88.0,
            ai_assistant_efficiency: 75.0,
            ..Default::default()
        }),
        comprehensive(ComprehensiveMetrics {
            total_revenue: 800.0,
            total_appointments: 12,
            appointment_success_rate: 78.0,
            ..Default::default()
        }),
        // Tenant with no appointments: contributes to sums, not to the
        // active count or averages
        comprehensive(ComprehensiveMetrics {
            total_revenue: 50.0,
            ..Default::default()
        }),
        TenantMetricRecord::new(
            Uuid::new_v4(),
            MetricPeriod::ThirtyDays,
            MetricPayload::PlatformCost(PlatformCostMetrics { platform_cost: 58.0 }),
            Utc::now(),
        ),
        TenantMetricRecord::new(
            Uuid::new_v4(),
            MetricPeriod::ThirtyDays,
            MetricPayload::PlatformCost(PlatformCostMetrics {
                platform_cost: 116.0,
            }),
            Utc::now(),
        ),
        TenantMetricRecord::new(
            Uuid::new_v4(),
            MetricPeriod::ThirtyDays,
            MetricPayload::ConversationBilling(ConversationBillingMetrics {
                total_cost_usd: 14.5,
                billable_conversations: 310,
                efficiency_pct: 96.0,
                spam_rate_pct: 4.0,
            }),
            Utc::now(),
        ),
    ]
}

#[test]
fn aggregation_is_idempotent() {
    let rows = sample_rows();
    let tenants = vec![active_tenant(SubscriptionTier::Basico)];
    let computed_at = Utc.with_ymd_and_hms(2025, 8, 30, 5, 0, 0).unwrap();
    let config = AggregationConfig::default();

    let first = aggregate_rows(
        &rows,
        &tenants,
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &config,
        computed_at,
    );
    let second = aggregate_rows(
        &rows,
        &tenants,
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &config,
        computed_at,
    );

    assert_eq!(first, second);
}

#[test]
fn platform_revenue_conserves_tenant_revenue() {
    let rows = sample_rows();
    let expected: f64 = rows
        .iter()
        .filter_map(|r| match &r.payload {
            MetricPayload::Comprehensive(m) => Some(m.total_revenue),
            _ => None,
        })
        .sum();

    let record = aggregate_rows(
        &rows,
        &[],
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &AggregationConfig::default(),
        Utc::now(),
    );

    assert_eq!(record.total_revenue, expected);
    assert_eq!(record.total_revenue, 2050.0);
}

#[test]
fn fallback_mrr_matches_tier_price_table() {
    let tenants = vec![
        active_tenant(SubscriptionTier::Basico),
        active_tenant(SubscriptionTier::Profissional),
        active_tenant(SubscriptionTier::Free),
    ];

    // No platform_cost rows at all: the fallback strategy must be selected
    let rows: Vec<TenantMetricRecord> = vec![comprehensive(ComprehensiveMetrics::default())];
    let method = select_calculation_method(&rows);
    assert_eq!(method, CalculationMethod::SubscriptionTierFallback);

    let record = aggregate_rows(
        &rows,
        &tenants,
        MetricPeriod::ThirtyDays,
        calc_date(),
        method,
        &AggregationConfig::default(),
        Utc::now(),
    );

    assert_eq!(record.platform_mrr, 174.00);
    assert_eq!(
        record.calculation_method,
        CalculationMethod::SubscriptionTierFallback
    );
}

#[test]
fn precise_mrr_sums_cost_rows_not_tier_prices() {
    let rows = sample_rows();
    let tenants = vec![
        active_tenant(SubscriptionTier::Enterprise),
        active_tenant(SubscriptionTier::Enterprise),
    ];
    let method = select_calculation_method(&rows);
    assert_eq!(method, CalculationMethod::PlatformCostRows);

    let record = aggregate_rows(
        &rows,
        &tenants,
        MetricPeriod::ThirtyDays,
        calc_date(),
        method,
        &AggregationConfig::default(),
        Utc::now(),
    );

    // 58 + 116 from cost rows; the enterprise tier prices are ignored
    assert_eq!(record.platform_mrr, 174.0);
}

#[test]
fn averages_skip_tenants_without_data() {
    let record = aggregate_rows(
        &sample_rows(),
        &[],
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &AggregationConfig::default(),
        Utc::now(),
    );

    // Two tenants reported a success rate (92, 78); the zero reporter is
    // excluded instead of diluting the average down
    assert_eq!(record.avg_appointment_success_rate, 85.0);
    // Only one tenant reported satisfaction and AI efficiency
    assert_eq!(record.avg_customer_satisfaction, 88.0);
    assert_eq!(record.avg_ai_efficiency, 75.0);
    assert_eq!(record.active_tenants, 2);
}

#[test]
fn billing_efficiency_average_skips_absent_reporters() {
    let billing = |efficiency_pct: f64, spam_rate_pct: f64| {
        TenantMetricRecord::new(
            Uuid::new_v4(),
            MetricPeriod::ThirtyDays,
            MetricPayload::ConversationBilling(ConversationBillingMetrics {
                total_cost_usd: 1.0,
                billable_conversations: 10,
                efficiency_pct,
                spam_rate_pct,
            }),
            Utc::now(),
        )
    };
    // One tenant reported 90% efficiency, one reported nothing (0.0)
    let rows = vec![billing(90.0, 4.0), billing(0.0, 0.0)];

    let record = aggregate_rows(
        &rows,
        &[],
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &AggregationConfig::default(),
        Utc::now(),
    );

    // Absent efficiency does not dilute the average
    assert_eq!(record.avg_conversation_efficiency_pct, 90.0);
    // A zero spam rate is real data and stays in the average
    assert_eq!(record.avg_spam_rate_pct, 2.0);
}

#[test]
fn utilization_score_follows_configured_weights() {
    let record = aggregate_rows(
        &sample_rows(),
        &[],
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &AggregationConfig::default(),
        Utc::now(),
    );

    let expected = 85.0 * 0.30 + 88.0 * 0.25 + 75.0 * 0.25 + (100.0 - 4.0) * 0.20;
    assert!((record.platform_utilization_score - expected).abs() < 1e-9);
}

#[test]
fn derived_ratios_come_from_aggregated_fields() {
    let record = aggregate_rows(
        &sample_rows(),
        &[],
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &AggregationConfig::default(),
        Utc::now(),
    );

    assert!((record.revenue_to_mrr_ratio - 2050.0 / 174.0).abs() < 1e-9);
    assert_eq!(record.avg_revenue_per_tenant, 2050.0 / 2.0);
}

#[test]
fn rows_with_unknown_fields_still_aggregate() {
    let row = TenantMetricRow {
        tenant_id: Uuid::new_v4(),
        metric_type: "comprehensive".to_string(),
        period: "30d".to_string(),
        metric_data: serde_json::json!({
            "total_revenue": 500.0,
            "total_appointments": 3,
            "field_from_a_newer_schema": [1, 2, 3]
        }),
        calculated_at: Utc::now(),
    };
    let record = row.decode().expect("tolerant decode");

    let aggregated = aggregate_rows(
        &[record],
        &[],
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &AggregationConfig::default(),
        Utc::now(),
    );
    assert_eq!(aggregated.total_revenue, 500.0);
    assert_eq!(aggregated.total_appointments, 3);
}

#[test]
fn validator_flags_only_drift_beyond_tolerance() {
    let rows = sample_rows();
    let baseline = aggregate_rows(
        &rows,
        &[],
        MetricPeriod::ThirtyDays,
        calc_date(),
        CalculationMethod::PlatformCostRows,
        &AggregationConfig::default(),
        Utc::now(),
    );

    let mut drifted = baseline.clone();
    drifted.total_revenue *= 1.005;
    assert!(diff_records(&baseline, &drifted, 0.01).is_empty());

    drifted.total_revenue = baseline.total_revenue * 1.05;
    let discrepancies = diff_records(&baseline, &drifted, 0.01);
    assert_eq!(discrepancies.len(), 1);
}
