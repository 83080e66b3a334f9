//! # Metrics Scheduler
//!
//! Fires the named pipeline jobs on fixed calendar schedules, each evaluated
//! in the deployment's fixed UTC offset and guarded against overlap: at most
//! one instance of a named job runs at a time, enforced by an in-memory
//! active-job set. A job failure is an isolated boundary; it increments the
//! error counter and never prevents future firings.
//!
//! ## Jobs
//!
//! - `daily_comprehensive` (2 AM): active tenants, bulk calculation, history
//!   pruning, platform aggregation across all periods
//! - `weekly_risk` (Sunday 1 AM): per-tenant recomputation fanned out through
//!   the concurrency manager at routine concurrency
//! - `monthly_evolution` (1st at midnight): per-tenant historical pass at
//!   reduced concurrency
//! - `cache_maintenance` (hourly): proactive cache eviction sweep
//!
//! Each job also has a manual trigger with a synchronous outcome, subject to
//! the same overlap guard.

use crate::aggregation::{ConsistencyValidator, PlatformAggregationEngine};
use crate::cache::MetricsCache;
use crate::calculator::TenantMetricsCalculator;
use crate::concurrency::{BatchOverrides, ConcurrencyManager};
use crate::config::SchedulerConfig;
use crate::database::SqlFunctionExecutor;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use cron::Schedule;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// The named jobs the scheduler knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    DailyComprehensive,
    WeeklyRisk,
    MonthlyEvolution,
    CacheMaintenance,
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::DailyComprehensive => "daily_comprehensive",
            JobKind::WeeklyRisk => "weekly_risk",
            JobKind::MonthlyEvolution => "monthly_evolution",
            JobKind::CacheMaintenance => "cache_maintenance",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Synchronous outcome of one job invocation
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed { success: bool, elapsed: Duration },
    /// Another instance of the same job was already in flight
    Skipped,
}

/// Last completed run of one job
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobRunRecord {
    pub success: bool,
    pub elapsed: Duration,
}

/// Process-wide scheduler observability state
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub overlap_skips: u64,
    /// Monotonically incrementing, never reset
    pub error_count: u64,
    pub last_runs: HashMap<&'static str, JobRunRecord>,
}

struct ScheduledJob {
    kind: JobKind,
    schedule: Schedule,
    next_fire: Mutex<Option<DateTime<FixedOffset>>>,
}

pub struct MetricsScheduler {
    config: SchedulerConfig,
    timezone: FixedOffset,
    jobs: Vec<ScheduledJob>,
    calculator: Arc<TenantMetricsCalculator>,
    engine: Arc<PlatformAggregationEngine>,
    validator: Arc<ConsistencyValidator>,
    manager: Arc<ConcurrencyManager>,
    executor: SqlFunctionExecutor,
    cache: Arc<MetricsCache>,
    keep_latest_metrics: i64,
    active_jobs: DashMap<&'static str, Instant>,
    stats: Mutex<SchedulerStats>,
    running: AtomicBool,
    shutdown_signal: Notify,
}

impl MetricsScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SchedulerConfig,
        calculator: Arc<TenantMetricsCalculator>,
        engine: Arc<PlatformAggregationEngine>,
        validator: Arc<ConsistencyValidator>,
        manager: Arc<ConcurrencyManager>,
        executor: SqlFunctionExecutor,
        cache: Arc<MetricsCache>,
        keep_latest_metrics: i64,
    ) -> Result<Self> {
        let timezone = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "invalid UTC offset: {} hours",
                config.utc_offset_hours
            ))
        })?;

        let mut jobs = Vec::new();
        let entries = [
            (JobKind::DailyComprehensive, &config.daily_comprehensive),
            (JobKind::WeeklyRisk, &config.weekly_risk),
            (JobKind::MonthlyEvolution, &config.monthly_evolution),
            (JobKind::CacheMaintenance, &config.cache_maintenance),
        ];
        for (kind, entry) in entries {
            if !entry.enabled {
                info!(job = %kind, "Scheduled job disabled by configuration");
                continue;
            }
            let schedule = Schedule::from_str(&entry.schedule).map_err(|e| {
                PipelineError::Scheduler(format!(
                    "invalid cron expression for {kind}: {} ({e})",
                    entry.schedule
                ))
            })?;
            jobs.push(ScheduledJob {
                kind,
                schedule,
                next_fire: Mutex::new(None),
            });
        }

        Ok(Self {
            config,
            timezone,
            jobs,
            calculator,
            engine,
            validator,
            manager,
            executor,
            cache,
            keep_latest_metrics,
            active_jobs: DashMap::new(),
            stats: Mutex::new(SchedulerStats::default()),
            running: AtomicBool::new(false),
            shutdown_signal: Notify::new(),
        })
    }

    /// Today in the scheduler's timezone, the calculation date for every run
    pub fn current_date(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.timezone).date_naive()
    }

    /// Tick loop. Runs until [`shutdown`](Self::shutdown) is called; due jobs
    /// are spawned so a slow job never delays the loop.
    pub async fn run(self: Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let now = Utc::now().with_timezone(&self.timezone);
        for job in &self.jobs {
            let next = job.schedule.after(&now).next();
            *job.next_fire.lock() = next;
            info!(job = %job.kind, next_fire = ?next, "Job scheduled");
        }

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_seconds));
        info!(
            jobs = self.jobs.len(),
            tick_interval_s = self.config.tick_interval_seconds,
            "⏰ SCHEDULER: Started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => Self::fire_due_jobs(&self),
                _ = self.shutdown_signal.notified() => break,
            }
        }

        self.drain_active_jobs().await;
        self.running.store(false, Ordering::SeqCst);
        info!("⏰ SCHEDULER: Stopped");
    }

    fn fire_due_jobs(this: &Arc<Self>) {
        let now = Utc::now().with_timezone(&this.timezone);
        for job in &this.jobs {
            let mut next_fire = job.next_fire.lock();
            let due = matches!(*next_fire, Some(at) if at <= now);
            if !due {
                continue;
            }
            *next_fire = job.schedule.after(&now).next();
            drop(next_fire);

            let kind = job.kind;
            let scheduler = Arc::clone(this);
            tokio::spawn(async move {
                let _ = scheduler.run_job(kind).await;
            });
        }
    }

    /// Stop ticking and wait up to the grace period for active jobs to drain
    pub async fn shutdown(&self) {
        info!("⏰ SCHEDULER: Shutdown requested");
        self.shutdown_signal.notify_waiters();
        self.drain_active_jobs().await;
    }

    async fn drain_active_jobs(&self) {
        let deadline = Instant::now() + Duration::from_secs(self.config.shutdown_grace_seconds);
        while !self.active_jobs.is_empty() {
            if Instant::now() >= deadline {
                let stuck: Vec<&str> = self.active_jobs.iter().map(|e| *e.key()).collect();
                warn!(?stuck, "Shutdown grace period elapsed with jobs still active");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Run one named job now, subject to the single-instance guard. Returns
    /// `Skipped` when the same job is already in flight.
    pub async fn run_job(&self, kind: JobKind) -> JobOutcome {
        let name = kind.name();
        match self.active_jobs.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                info!(job = name, "Job already in flight, skipping this invocation");
                self.stats.lock().overlap_skips += 1;
                return JobOutcome::Skipped;
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Instant::now());
            }
        }
        self.stats.lock().jobs_started += 1;

        let started = Instant::now();
        let result = self.execute(kind).await;
        let elapsed = started.elapsed();
        self.active_jobs.remove(name);

        let success = match result {
            Ok(()) => {
                info!(job = name, elapsed_ms = elapsed.as_millis() as u64, "✅ JOB: Completed");
                true
            }
            Err(err) => {
                error!(job = name, error = %err, elapsed_ms = elapsed.as_millis() as u64, "❌ JOB: Failed");
                false
            }
        };

        {
            let mut stats = self.stats.lock();
            if success {
                stats.jobs_succeeded += 1;
            } else {
                stats.jobs_failed += 1;
                stats.error_count += 1;
            }
            stats.last_runs.insert(name, JobRunRecord { success, elapsed });
        }

        JobOutcome::Completed { success, elapsed }
    }

    async fn execute(&self, kind: JobKind) -> Result<()> {
        match kind {
            JobKind::DailyComprehensive => self.run_comprehensive().await,
            JobKind::WeeklyRisk => self.run_risk_assessment().await,
            JobKind::MonthlyEvolution => self.run_evolution().await,
            JobKind::CacheMaintenance => self.run_cache_maintenance().await,
        }
    }

    /// Daily pipeline: one bulk call covers every tenant and period, then the
    /// platform rollups are rebuilt from the fresh rows
    async fn run_comprehensive(&self) -> Result<()> {
        let date = self.current_date();
        let summary = self.calculator.calculate(date, None).await?;

        let pruned = self
            .executor
            .prune_superseded_metrics(self.keep_latest_metrics)
            .await?;

        let report = self.engine.aggregate_all_periods(date).await;
        if !report.is_complete() {
            // Partial aggregation is successful-with-errors; the counters and
            // logs carry the failures
            warn!(
                failed_periods = report.failures.len(),
                "Comprehensive run finished with period aggregation failures"
            );
        }

        info!(
            calculation_date = %date,
            processed_tenants = summary.processed_tenants,
            metrics_created = summary.metrics_created,
            pruned_rows = pruned,
            aggregated_periods = report.records.len(),
            "Daily comprehensive run finished"
        );
        Ok(())
    }

    /// Weekly audit: per-tenant recomputation fanned out at routine
    /// concurrency, then a consistency pass over the rollups
    async fn run_risk_assessment(&self) -> Result<()> {
        let date = self.current_date();
        let tenants = self.calculator.active_tenants().await?;
        let tenant_ids: Vec<_> = tenants.iter().map(|t| t.id).collect();

        // A tripped circuit makes the whole job a failed run, not a partial one
        let outcome = self
            .manager
            .process(
                tenant_ids,
                |tenant_id| self.calculator.calculate(date, Some(tenant_id)),
                BatchOverrides::default(),
            )
            .await?
            .require_circuit_closed(JobKind::WeeklyRisk.name())?;

        let reports = self.validator.validate_all().await?;
        let inconsistent = reports.iter().filter(|r| !r.is_consistent()).count();

        info!(
            tenants = tenants.len(),
            succeeded = outcome.successes.len(),
            failed = outcome.failures.len(),
            inconsistent_periods = inconsistent,
            "Weekly risk assessment finished"
        );
        Ok(())
    }

    /// Monthly historical pass at reduced concurrency; heavy reads must not
    /// crowd the pool
    async fn run_evolution(&self) -> Result<()> {
        let date = self.current_date();
        let tenants = self.calculator.active_tenants().await?;
        let tenant_ids: Vec<_> = tenants.iter().map(|t| t.id).collect();

        let reduced = (self.manager.config().max_concurrency / 2).max(1);
        let outcome = self
            .manager
            .process(
                tenant_ids,
                |tenant_id| self.calculator.calculate(date, Some(tenant_id)),
                BatchOverrides::reduced(reduced),
            )
            .await?
            .require_circuit_closed(JobKind::MonthlyEvolution.name())?;

        info!(
            tenants = tenants.len(),
            succeeded = outcome.successes.len(),
            failed = outcome.failures.len(),
            "Monthly evolution run finished"
        );
        Ok(())
    }

    async fn run_cache_maintenance(&self) -> Result<()> {
        let evicted = self.cache.optimize();
        let stats = self.cache.stats();
        info!(
            evicted,
            entries = stats.entries,
            hit_rate = %format!("{:.1}%", stats.hit_rate * 100.0),
            "Hourly cache maintenance finished"
        );
        Ok(())
    }

    // Manual trigger surface: same bodies, same overlap guard, synchronous
    // outcome for the operator

    pub async fn trigger_comprehensive(&self) -> JobOutcome {
        self.run_job(JobKind::DailyComprehensive).await
    }

    pub async fn trigger_risk_assessment(&self) -> JobOutcome {
        self.run_job(JobKind::WeeklyRisk).await
    }

    pub async fn trigger_evolution(&self) -> JobOutcome {
        self.run_job(JobKind::MonthlyEvolution).await
    }

    /// Rebuild the platform rollups out-of-band without a bulk recalculation
    pub async fn trigger_platform_aggregation(&self) -> JobOutcome {
        let name = "platform_aggregation";
        match self.active_jobs.entry(name) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                info!(job = name, "Job already in flight, skipping this invocation");
                self.stats.lock().overlap_skips += 1;
                return JobOutcome::Skipped;
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Instant::now());
            }
        }
        self.stats.lock().jobs_started += 1;

        let started = Instant::now();
        let report = self.engine.aggregate_all_periods(self.current_date()).await;
        let elapsed = started.elapsed();
        self.active_jobs.remove(name);

        let success = report.is_complete();
        {
            let mut stats = self.stats.lock();
            if success {
                stats.jobs_succeeded += 1;
            } else {
                stats.jobs_failed += 1;
                stats.error_count += 1;
            }
            stats.last_runs.insert(name, JobRunRecord { success, elapsed });
        }
        JobOutcome::Completed { success, elapsed }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
