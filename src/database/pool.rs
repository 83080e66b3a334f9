//! # Connection Pool Manager
//!
//! Bounds concurrent connections to Postgres. Every parallel worker in the
//! pipeline funnels through this pool, so total concurrent database work is
//! capped here independently of how many logical workers exist upstream.
//!
//! The in-use and waiting counters are tracked with atomics so a synthetic run
//! can verify the bounded-concurrency property against the pool itself.

use crate::config::DatabasePoolConfig;
use crate::error::{PipelineError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Point-in-time pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
    pub in_use: usize,
    pub waiting: usize,
}

#[derive(Debug, Default)]
struct PoolCounters {
    in_use: AtomicUsize,
    waiting: AtomicUsize,
    peak_in_use: AtomicUsize,
}

/// Managed Postgres pool with occupancy tracking
#[derive(Clone)]
pub struct PoolManager {
    pool: PgPool,
    counters: Arc<PoolCounters>,
}

impl PoolManager {
    /// Build the pool from configuration. This is the only operation in the
    /// pipeline allowed to fail initialization outright.
    pub async fn connect(config: &DatabasePoolConfig) -> Result<Self> {
        let url = config.database_url()?;

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .connect(&url)
            .await
            .map_err(|e| {
                PipelineError::Configuration(format!("failed to construct database pool: {e}"))
            })?;

        info!(
            min_connections = config.min_connections,
            max_connections = config.max_connections,
            acquire_timeout_s = config.acquire_timeout_seconds,
            "🔌 POOL: Database connection pool ready"
        );

        Ok(Self {
            pool,
            counters: Arc::new(PoolCounters::default()),
        })
    }

    /// Wrap an existing pool, for tests that bring their own
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Acquire a connection, run `f`, and release on every exit path. Blocks
    /// up to the configured acquire timeout; a saturated pool surfaces as
    /// [`PipelineError::PoolExhausted`].
    pub async fn with_connection<F, Fut, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(PoolConnection<Postgres>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let waited_from = Instant::now();
        self.counters.waiting.fetch_add(1, Ordering::SeqCst);
        let acquired = self.pool.acquire().await;
        self.counters.waiting.fetch_sub(1, Ordering::SeqCst);

        let conn = acquired.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => PipelineError::PoolExhausted {
                waited: waited_from.elapsed(),
            },
            other => PipelineError::Database(other),
        })?;

        let _guard = InUseGuard::enter(&self.counters);
        f(conn).await
    }

    /// Liveness probe plus occupancy snapshot
    pub async fn health(&self) -> Result<PoolHealth> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        let health = self.snapshot();
        debug!(
            size = health.size,
            idle = health.idle,
            in_use = health.in_use,
            waiting = health.waiting,
            "Pool health probe"
        );
        Ok(health)
    }

    /// Occupancy without touching the database
    pub fn snapshot(&self) -> PoolHealth {
        PoolHealth {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            in_use: self.counters.in_use.load(Ordering::SeqCst),
            waiting: self.counters.waiting.load(Ordering::SeqCst),
        }
    }

    /// Highest concurrent in-use count observed since the last reset
    pub fn peak_in_use(&self) -> usize {
        self.counters.peak_in_use.load(Ordering::SeqCst)
    }

    pub fn reset_peak(&self) {
        self.counters.peak_in_use.store(0, Ordering::SeqCst);
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decrements the in-use counter on drop, covering early returns and errors
struct InUseGuard<'a> {
    counters: &'a PoolCounters,
}

impl<'a> InUseGuard<'a> {
    fn enter(counters: &'a PoolCounters) -> Self {
        let now = counters.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_use.fetch_max(now, Ordering::SeqCst);
        Self { counters }
    }
}

impl Drop for InUseGuard<'_> {
    fn drop(&mut self) {
        self.counters.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_use_guard_tracks_peak() {
        let counters = PoolCounters::default();
        {
            let _a = InUseGuard::enter(&counters);
            let _b = InUseGuard::enter(&counters);
            assert_eq!(counters.in_use.load(Ordering::SeqCst), 2);
        }
        assert_eq!(counters.in_use.load(Ordering::SeqCst), 0);
        assert_eq!(counters.peak_in_use.load(Ordering::SeqCst), 2);
    }
}
