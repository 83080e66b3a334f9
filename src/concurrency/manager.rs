//! # Concurrency Manager
//!
//! Executes an async unit of work over N items with a bounded concurrency
//! ceiling C and batch size B, returning a partition of successes and
//! failures instead of throwing on partial failure.
//!
//! ## Contract
//!
//! - Items are split into chunks of size B; each chunk fans out through
//!   `buffer_unordered(C)`, so at most C operations are in flight at any
//!   instant
//! - Each item gets bounded retries under the configured [`RetryPolicy`]
//!   before being recorded as a failure
//! - The circuit breaker is consulted between chunks. Once open, no further
//!   chunk is dispatched, in-flight work drains, and `circuit_open = true`
//!   surfaces to the caller. The first chunk of a run always dispatches, so a
//!   trip in one run never starves the next run outright.
//! - Individual item failures never fail the call. Only a dispatch
//!   misconfiguration (C == 0 or B == 0) does.

use super::{CircuitBreaker, CircuitSnapshot};
use crate::config::ConcurrencyConfig;
use crate::error::{PipelineError, Result};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Per-call tuning knobs; `None` keeps the configured value
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOverrides {
    pub max_concurrency: Option<usize>,
    pub batch_size: Option<usize>,
}

impl BatchOverrides {
    /// Reduced fan-out for heavy historical reads
    pub fn reduced(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: Some(max_concurrency),
            batch_size: None,
        }
    }
}

/// One item that exhausted its retries
#[derive(Debug)]
pub struct ItemFailure<I> {
    pub item: I,
    pub error: PipelineError,
}

/// Partitioned result of one batch run
#[derive(Debug)]
pub struct BatchOutcome<I, T> {
    pub successes: Vec<T>,
    pub failures: Vec<ItemFailure<I>>,
    /// Items never dispatched because the breaker opened
    pub skipped: usize,
    pub circuit_open: bool,
    pub elapsed: Duration,
}

impl<I, T> BatchOutcome<I, T> {
    pub fn is_fully_successful(&self) -> bool {
        self.failures.is_empty() && !self.circuit_open
    }

    /// Promote a degraded run to an error, for callers that treat an open
    /// circuit as a failed job rather than a partial result
    pub fn require_circuit_closed(self, component: &str) -> Result<Self> {
        if self.circuit_open {
            Err(PipelineError::CircuitOpen {
                component: component.to_string(),
            })
        } else {
            Ok(self)
        }
    }
}

/// Cumulative counters for one manager instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub runs: u64,
    pub items_dispatched: u64,
    pub items_succeeded: u64,
    pub items_failed: u64,
    pub items_skipped: u64,
    pub circuit_trips: u64,
}

/// Bounded-concurrency batch executor with retry and circuit breaking
pub struct ConcurrencyManager {
    config: ConcurrencyConfig,
    breaker: CircuitBreaker,
    stats: Mutex<ProcessingStats>,
}

impl ConcurrencyManager {
    pub fn new(config: ConcurrencyConfig) -> Self {
        let breaker = CircuitBreaker::new(
            "concurrency_manager",
            config.circuit_breaker_threshold,
            config.circuit_breaker_cooldown(),
        );
        Self {
            config,
            breaker,
            stats: Mutex::new(ProcessingStats::default()),
        }
    }

    /// Run `worker` over `items` with bounded concurrency. Always returns an
    /// outcome for a well-configured dispatch; partial failure is data, not
    /// an error.
    pub async fn process<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        worker: F,
        overrides: BatchOverrides,
    ) -> Result<BatchOutcome<I, T>>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let concurrency = overrides
            .max_concurrency
            .unwrap_or(self.config.max_concurrency);
        let batch_size = overrides.batch_size.unwrap_or(self.config.batch_size);
        if concurrency == 0 || batch_size == 0 {
            return Err(PipelineError::Configuration(format!(
                "cannot dispatch with concurrency {concurrency} and batch size {batch_size}"
            )));
        }

        let started = Instant::now();
        let was_open_at_start = self.breaker.is_open();
        let total = items.len();
        let mut successes = Vec::new();
        let mut failures: Vec<ItemFailure<I>> = Vec::new();
        let mut dispatched = 0usize;
        let mut circuit_open = false;

        debug!(
            total_items = total,
            concurrency, batch_size, "Dispatching work batch"
        );

        for (chunk_index, chunk) in items.chunks(batch_size).enumerate() {
            // The first chunk of a run always dispatches; a breaker left open
            // by a previous run must not starve this one before it can prove
            // itself
            if chunk_index > 0 && self.breaker.is_open() {
                circuit_open = true;
                warn!(
                    dispatched,
                    remaining = total - dispatched,
                    "Circuit open, halting dispatch for the rest of this run"
                );
                break;
            }

            let results: Vec<std::result::Result<T, ItemFailure<I>>> =
                stream::iter(chunk.iter().cloned())
                    .map(|item| self.run_item(item, &worker))
                    .buffer_unordered(concurrency)
                    .collect()
                    .await;
            dispatched += chunk.len();

            for result in results {
                match result {
                    Ok(value) => successes.push(value),
                    Err(failure) => failures.push(failure),
                }
            }
        }

        // Capture a trip that happened during the final chunk; an already-open
        // breaker inherited from a previous run does not count against this one
        if !circuit_open && !was_open_at_start && self.breaker.is_open() {
            circuit_open = true;
        }

        // A clean completion with at least one success ends the failure
        // streak for the next run
        if !circuit_open && !successes.is_empty() {
            self.breaker.reset();
        }

        let elapsed = started.elapsed();
        let skipped = total - dispatched;

        {
            let mut stats = self.stats.lock();
            stats.runs += 1;
            stats.items_dispatched += dispatched as u64;
            stats.items_succeeded += successes.len() as u64;
            stats.items_failed += failures.len() as u64;
            stats.items_skipped += skipped as u64;
            if circuit_open {
                stats.circuit_trips += 1;
            }
        }

        info!(
            total_items = total,
            succeeded = successes.len(),
            failed = failures.len(),
            skipped,
            circuit_open,
            elapsed_ms = elapsed.as_millis() as u64,
            "⚙️ BATCH: Run complete"
        );

        Ok(BatchOutcome {
            successes,
            failures,
            skipped,
            circuit_open,
            elapsed,
        })
    }

    async fn run_item<I, T, F, Fut>(
        &self,
        item: I,
        worker: &F,
    ) -> std::result::Result<T, ItemFailure<I>>
    where
        I: Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.config.retry;
        let mut attempt = 1u32;
        loop {
            match worker(item.clone()).await {
                Ok(value) => {
                    self.breaker.record_success();
                    return Ok(value);
                }
                Err(error) if attempt < policy.max_attempts => {
                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Item failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    self.breaker.record_failure();
                    return Err(ItemFailure { item, error });
                }
            }
        }
    }

    pub fn config(&self) -> &ConcurrencyConfig {
        &self.config
    }

    /// Close the breaker out-of-band (operator action)
    pub fn reset_breaker(&self) {
        self.breaker.reset();
    }

    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    pub fn stats(&self) -> ProcessingStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConcurrencyConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn manager() -> ConcurrencyManager {
        ConcurrencyManager::new(ConcurrencyConfig::for_test())
    }

    #[tokio::test]
    async fn test_in_flight_never_exceeds_ceiling() {
        let mgr = manager();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<u32> = (0..40).collect();
        let outcome = mgr
            .process(
                items,
                |n| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(n * 2)
                    }
                },
                BatchOverrides::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.successes.len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let mgr = manager();
        let items = vec!["x", "y", "z"];
        let outcome = mgr
            .process(
                items,
                |name| async move {
                    if name == "x" {
                        Err(PipelineError::Validation("boom".to_string()))
                    } else {
                        Ok(name)
                    }
                },
                BatchOverrides::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.successes.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].item, "x");
        assert!(!outcome.circuit_open);
    }

    #[tokio::test]
    async fn test_breaker_trips_mid_run_and_resets_on_clean_run() {
        let mgr = manager();

        // Test config: batch size 5, threshold 3. Every item fails, so the
        // breaker opens during the first chunk and the rest is skipped.
        let items: Vec<u32> = (0..20).collect();
        let outcome = mgr
            .process(
                items,
                |_| async { Err::<u32, _>(PipelineError::Validation("down".to_string())) },
                BatchOverrides::default(),
            )
            .await
            .unwrap();

        assert!(outcome.circuit_open);
        assert_eq!(outcome.failures.len(), 5);
        assert_eq!(outcome.skipped, 15);
        assert!(mgr.circuit_snapshot().is_open);

        // A clean run dispatches its first chunk regardless and closes the
        // breaker on completion
        let outcome = mgr
            .process(
                (0..5).collect::<Vec<u32>>(),
                |n| async move { Ok(n) },
                BatchOverrides::default(),
            )
            .await
            .unwrap();
        assert!(outcome.is_fully_successful());
        assert!(!mgr.circuit_snapshot().is_open);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let mgr = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let outcome = mgr
            .process(
                vec![1u32],
                |n| {
                    let calls = calls.clone();
                    async move {
                        if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(PipelineError::Validation("first attempt".to_string()))
                        } else {
                            Ok(n)
                        }
                    }
                },
                BatchOverrides::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.successes, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_a_configuration_error() {
        let mgr = manager();
        let result = mgr
            .process(
                vec![1u32],
                |n| async move { Ok(n) },
                BatchOverrides {
                    max_concurrency: Some(0),
                    batch_size: None,
                },
            )
            .await;
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_stats_accumulate_per_instance() {
        let mgr = manager();
        mgr.process(
            (0..6).collect::<Vec<u32>>(),
            |n| async move { Ok(n) },
            BatchOverrides::default(),
        )
        .await
        .unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.items_succeeded, 6);
        assert_eq!(stats.items_failed, 0);
    }
}
