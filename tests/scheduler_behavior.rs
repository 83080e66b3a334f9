//! Scheduler and pipeline wiring behavior that does not need a live
//! database. A lazily-connected pool pointed at a closed port makes every
//! store access fail fast, which is exactly what the failure-isolation
//! properties need.

use sqlx::postgres::PgPoolOptions;
use tenant_metrics_core::config::PipelineConfig;
use tenant_metrics_core::database::PoolManager;
use tenant_metrics_core::scheduler::{JobKind, JobOutcome};
use tenant_metrics_core::{MetricsPipeline, PipelineError};

fn unreachable_pipeline() -> MetricsPipeline {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect_lazy("postgres://metrics@127.0.0.1:1/metrics")
        .expect("lazy pool construction is offline");
    MetricsPipeline::new(PipelineConfig::for_test(), PoolManager::from_pool(pool))
        .expect("wiring succeeds without touching the store")
}

#[tokio::test]
async fn wiring_succeeds_without_a_reachable_store() {
    let pipeline = unreachable_pipeline();
    let stats = pipeline.stats();
    assert_eq!(stats.scheduler.jobs_started, 0);
    assert_eq!(stats.processing.runs, 0);
    assert_eq!(stats.cache.hits, 0);
}

#[tokio::test]
async fn failed_job_increments_error_counter_without_poisoning_others() {
    let pipeline = unreachable_pipeline();
    let scheduler = pipeline.scheduler();

    // The comprehensive run needs the store and must fail
    let outcome = scheduler.trigger_comprehensive().await;
    assert!(matches!(
        outcome,
        JobOutcome::Completed { success: false, .. }
    ));

    // Cache maintenance needs nothing external and still runs
    let outcome = scheduler.run_job(JobKind::CacheMaintenance).await;
    assert!(matches!(
        outcome,
        JobOutcome::Completed { success: true, .. }
    ));

    let stats = scheduler.stats();
    assert_eq!(stats.jobs_started, 2);
    assert_eq!(stats.jobs_failed, 1);
    assert_eq!(stats.jobs_succeeded, 1);
    assert_eq!(stats.error_count, 1);
}

#[tokio::test]
async fn error_counter_is_monotonic_across_failures() {
    let pipeline = unreachable_pipeline();
    let scheduler = pipeline.scheduler();

    for _ in 0..3 {
        scheduler.trigger_comprehensive().await;
    }
    assert_eq!(scheduler.stats().error_count, 3);
}

#[tokio::test]
async fn manual_triggers_record_per_job_outcomes() {
    let pipeline = unreachable_pipeline();
    let scheduler = pipeline.scheduler();

    scheduler.trigger_risk_assessment().await;
    scheduler.trigger_evolution().await;

    let stats = scheduler.stats();
    assert!(stats.last_runs.contains_key("weekly_risk"));
    assert!(stats.last_runs.contains_key("monthly_evolution"));
}

#[tokio::test]
async fn invalid_cron_expression_fails_construction() {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://metrics@127.0.0.1:1/metrics")
        .unwrap();
    let mut config = PipelineConfig::for_test();
    config.scheduler.daily_comprehensive.schedule = "not a cron line".to_string();

    let result = MetricsPipeline::new(config, PoolManager::from_pool(pool));
    assert!(matches!(result, Err(PipelineError::Scheduler(_))));
}
