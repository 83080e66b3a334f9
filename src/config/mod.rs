//! # Pipeline Configuration System
//!
//! Environment-aware configuration for the metrics pipeline. Each component
//! gets an explicit config struct with per-environment constructors
//! (`for_test`, `for_development`, defaults for production) and environment
//! variable overrides. No silent fallbacks: values that cannot be validated
//! fail construction with a configuration error.

use crate::concurrency::RetryPolicy;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use tracing::info;

/// Root configuration for the whole pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Database connection and pooling
    pub database: DatabasePoolConfig,

    /// Metrics cache behavior
    pub cache: CacheConfig,

    /// Batch executor sizing, retry and circuit breaker
    pub concurrency: ConcurrencyConfig,

    /// Cron schedules for the named jobs
    pub scheduler: SchedulerConfig,

    /// Aggregation tunables (fallback price table, utilization weights)
    pub aggregation: AggregationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: DatabasePoolConfig::default(),
            cache: CacheConfig::default(),
            concurrency: ConcurrencyConfig::detected(),
            scheduler: SchedulerConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Test-optimized configuration: small pool, rapid cache expiry, tight
    /// retry delays
    pub fn for_test() -> Self {
        Self {
            database: DatabasePoolConfig {
                min_connections: 1,
                max_connections: 5,
                acquire_timeout_seconds: 2,
                idle_timeout_seconds: 30,
                ..DatabasePoolConfig::default()
            },
            cache: CacheConfig::for_test(),
            concurrency: ConcurrencyConfig::for_test(),
            scheduler: SchedulerConfig::default(),
            aggregation: AggregationConfig::default(),
        }
    }

    /// Load configuration from environment or use defaults
    pub fn from_environment() -> Result<Self> {
        let environment = env::var("METRICS_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .or_else(|_| env::var("RUST_ENV"))
            .unwrap_or_else(|_| "production".to_string());

        let config = match environment.as_str() {
            "test" => {
                info!("Loading test pipeline configuration (rapid cache invalidation)");
                Self::for_test()
            }
            _ => {
                info!("Loading production pipeline configuration");
                Self::default()
            }
        };

        config.with_env_overrides()
    }

    /// Apply environment variable overrides and validate
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = env::var("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Ok(max) = env::var("METRICS_POOL_MAX_CONNECTIONS") {
            if let Ok(parsed) = max.parse() {
                self.database.max_connections = parsed;
                info!(max_connections = self.database.max_connections, "Pool size override");
            }
        }
        if let Ok(concurrency) = env::var("METRICS_MAX_CONCURRENCY") {
            if let Ok(parsed) = concurrency.parse() {
                self.concurrency.max_concurrency = parsed;
            }
        }
        if let Ok(schedule) = env::var("DAILY_METRICS_SCHEDULE") {
            self.scheduler.daily_comprehensive.schedule = schedule;
        }
        if let Ok(enabled) = env::var("ENABLE_DAILY_METRICS") {
            self.scheduler.daily_comprehensive.enabled = enabled != "false";
        }
        if let Ok(enabled) = env::var("ENABLE_WEEKLY_RISK") {
            self.scheduler.weekly_risk.enabled = enabled != "false";
        }
        if let Ok(enabled) = env::var("ENABLE_MONTHLY_EVOLUTION") {
            self.scheduler.monthly_evolution.enabled = enabled != "false";
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(PipelineError::Configuration(
                "database.max_connections must be positive".to_string(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(PipelineError::Configuration(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        if self.concurrency.max_concurrency == 0 || self.concurrency.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "concurrency ceiling and batch size must be positive".to_string(),
            ));
        }
        self.aggregation.validate()
    }
}

/// Database connection and pooling configuration.
///
/// The pool has a minimum warm size to avoid cold-start latency and a maximum
/// hard cap protecting the store from overload. Workers funnel through this
/// pool, so total concurrent database work stays capped independently of how
/// many logical workers the concurrency manager spins up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabasePoolConfig {
    /// Connection string; falls back to DATABASE_URL at connect time
    pub url: Option<String>,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            url: None,
            min_connections: 10,
            max_connections: 100,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: 300,
        }
    }
}

impl DatabasePoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    pub fn database_url(&self) -> Result<String> {
        self.url
            .clone()
            .or_else(|| env::var("DATABASE_URL").ok())
            .ok_or_else(|| {
                PipelineError::Configuration("DATABASE_URL is not configured".to_string())
            })
    }
}

/// Configuration for a specific class of cached data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTypeConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl CacheTypeConfig {
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Metrics cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Active-tenant list (short TTL, consumed once per run)
    pub active_tenants: CacheTypeConfig,
    /// Platform-wide totals per period
    pub platform_totals: CacheTypeConfig,
    /// Entries this close to expiry are evicted by optimize()
    pub near_expiry_window_seconds: u64,
}

impl Default for CacheConfig {
    /// Production defaults: 10 minute tenant list, 30 minute platform totals
    fn default() -> Self {
        Self {
            enabled: true,
            active_tenants: CacheTypeConfig {
                ttl_seconds: 600,
                max_entries: 10,
            },
            platform_totals: CacheTypeConfig {
                ttl_seconds: 1800,
                max_entries: 100,
            },
            near_expiry_window_seconds: 60,
        }
    }
}

impl CacheConfig {
    /// Rapid-expiry configuration for tests
    pub fn for_test() -> Self {
        Self {
            enabled: true,
            active_tenants: CacheTypeConfig {
                ttl_seconds: 1,
                max_entries: 10,
            },
            platform_totals: CacheTypeConfig {
                ttl_seconds: 1,
                max_entries: 20,
            },
            near_expiry_window_seconds: 1,
        }
    }
}

/// Batch executor sizing, retry policy and circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum in-flight operations at any instant
    pub max_concurrency: usize,
    /// Items per dispatched chunk
    pub batch_size: usize,
    /// Consecutive cross-item failures before the breaker opens
    pub circuit_breaker_threshold: u64,
    /// How long an open breaker rejects new dispatch
    pub circuit_breaker_cooldown_seconds: u64,
    /// Per-item retry policy
    pub retry: RetryPolicy,
}

impl ConcurrencyConfig {
    /// Derive ceiling and batch size from available CPU parallelism, clamped
    /// the same way the production deployment sizes itself
    pub fn detected() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let max_concurrency = (cpu_count * 4).clamp(20, 100);

        Self {
            max_concurrency,
            batch_size: 50,
            circuit_breaker_threshold: 50,
            circuit_breaker_cooldown_seconds: 300,
            retry: RetryPolicy::default(),
        }
    }

    pub fn for_test() -> Self {
        Self {
            max_concurrency: 4,
            batch_size: 5,
            circuit_breaker_threshold: 3,
            circuit_breaker_cooldown_seconds: 1,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
                jitter: false,
            },
        }
    }

    pub fn circuit_breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_cooldown_seconds)
    }
}

/// One named job's schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobScheduleConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds resolution)
    pub schedule: String,
}

/// Cron schedules for the named jobs. Schedules are evaluated in the
/// configured fixed UTC offset (the deployment runs on São Paulo time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// UTC offset hours applied when evaluating cron expressions
    pub utc_offset_hours: i32,
    /// Daily comprehensive run, 2 AM off-peak
    pub daily_comprehensive: JobScheduleConfig,
    /// Weekly risk assessment, Sunday 1 AM
    pub weekly_risk: JobScheduleConfig,
    /// Monthly evolution, 1st of month at midnight
    pub monthly_evolution: JobScheduleConfig,
    /// Hourly cache maintenance
    pub cache_maintenance: JobScheduleConfig,
    /// Tick resolution of the scheduler loop
    pub tick_interval_seconds: u64,
    /// How long shutdown waits for active jobs to drain
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: -3,
            daily_comprehensive: JobScheduleConfig {
                enabled: true,
                schedule: "0 0 2 * * *".to_string(),
            },
            weekly_risk: JobScheduleConfig {
                enabled: true,
                schedule: "0 0 1 * * SUN".to_string(),
            },
            monthly_evolution: JobScheduleConfig {
                enabled: true,
                schedule: "0 0 0 1 * *".to_string(),
            },
            cache_maintenance: JobScheduleConfig {
                enabled: true,
                schedule: "0 0 * * * *".to_string(),
            },
            tick_interval_seconds: 30,
            shutdown_grace_seconds: 30,
        }
    }
}

/// Weights for the platform utilization score. Business-tunable, summing to
/// 1.0: success rate, customer satisfaction, AI efficiency, inverse spam rate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UtilizationWeights {
    pub success_rate: f64,
    pub satisfaction: f64,
    pub ai_efficiency: f64,
    pub inverse_spam: f64,
}

impl Default for UtilizationWeights {
    fn default() -> Self {
        Self {
            success_rate: 0.30,
            satisfaction: 0.25,
            ai_efficiency: 0.25,
            inverse_spam: 0.20,
        }
    }
}

/// Aggregation tunables: the subscription-tier fallback price table and the
/// utilization score weighting. Both are configuration, not invariants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Monthly price per subscription plan, used by the MRR fallback path
    pub plan_prices: HashMap<String, f64>,
    pub utilization_weights: UtilizationWeights,
    /// Superseded metric rows retained per (tenant, type, period)
    pub keep_latest_metrics: i64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        let mut plan_prices = HashMap::new();
        plan_prices.insert("free".to_string(), 0.0);
        plan_prices.insert("basico".to_string(), 58.00);
        plan_prices.insert("profissional".to_string(), 116.00);
        plan_prices.insert("enterprise".to_string(), 290.00);

        Self {
            plan_prices,
            utilization_weights: UtilizationWeights::default(),
            keep_latest_metrics: 5,
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<()> {
        let w = &self.utilization_weights;
        let sum = w.success_rate + w.satisfaction + w.ai_efficiency + w.inverse_spam;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(PipelineError::Configuration(format!(
                "utilization weights must sum to 1.0, got {sum}"
            )));
        }
        if self.keep_latest_metrics < 1 {
            return Err(PipelineError::Configuration(
                "keep_latest_metrics must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_detected_concurrency_within_clamps() {
        let config = ConcurrencyConfig::detected();
        assert!(config.max_concurrency >= 20);
        assert!(config.max_concurrency <= 100);
    }

    #[test]
    fn test_invalid_utilization_weights_rejected() {
        let mut config = AggregationConfig::default();
        config.utilization_weights.success_rate = 0.9;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_min_connections_cannot_exceed_max() {
        let mut config = PipelineConfig::for_test();
        config.database.min_connections = 50;
        config.database.max_connections = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_plan_prices() {
        let config = AggregationConfig::default();
        assert_eq!(config.plan_prices.get("basico"), Some(&58.00));
        assert_eq!(config.plan_prices.get("profissional"), Some(&116.00));
        assert_eq!(config.plan_prices.get("free"), Some(&0.0));
    }
}
