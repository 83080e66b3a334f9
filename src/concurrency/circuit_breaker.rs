//! # Circuit Breaker
//!
//! Protective signal against sustained cross-item failure. Lives only in
//! memory and is rebuilt fresh on process restart; it is a short-horizon
//! guard, not an audit record.
//!
//! State is the pair {consecutive_failures, open_until}. Once the consecutive
//! failure count crosses the threshold the breaker opens for a cooldown
//! window, during which the manager dispatches no new work. It closes again
//! when the cooldown lapses, when a run completes with at least one success,
//! or on an explicit reset.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Point-in-time breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub consecutive_failures: u64,
    pub is_open: bool,
}

pub struct CircuitBreaker {
    component: String,
    threshold: u64,
    cooldown: Duration,
    consecutive_failures: AtomicU64,
    open_until: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(component: impl Into<String>, threshold: u64, cooldown: Duration) -> Self {
        Self {
            component: component.into(),
            threshold,
            cooldown,
            consecutive_failures: AtomicU64::new(0),
            open_until: Mutex::new(None),
        }
    }

    /// A completed item succeeded; the consecutive failure streak ends
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// A completed item failed after exhausting its retries. Opens the
    /// breaker when the streak crosses the threshold.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            let mut open_until = self.open_until.lock();
            if open_until.is_none() {
                *open_until = Some(Instant::now() + self.cooldown);
                warn!(
                    component = %self.component,
                    consecutive_failures = failures,
                    cooldown_s = self.cooldown.as_secs(),
                    "⚡ CIRCUIT BREAKER: Opened after consecutive failures"
                );
            }
        }
    }

    /// Whether new work may be dispatched. A lapsed cooldown closes the
    /// breaker as a side effect.
    pub fn is_open(&self) -> bool {
        let mut open_until = self.open_until.lock();
        match *open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                *open_until = None;
                self.consecutive_failures.store(0, Ordering::SeqCst);
                info!(component = %self.component, "Circuit breaker cooldown lapsed, closing");
                false
            }
            None => false,
        }
    }

    /// Close the breaker and clear the failure streak
    pub fn reset(&self) {
        let was_open = self.open_until.lock().take().is_some();
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if was_open {
            info!(component = %self.component, "Circuit breaker reset");
        }
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            consecutive_failures: self.consecutive_failures.load(Ordering::SeqCst),
            is_open: self.is_open(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_resets_streak() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_cooldown_lapse_closes() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        breaker.record_failure();
        assert!(breaker.is_open());
        std::thread::sleep(Duration::from_millis(20));
        assert!(!breaker.is_open());
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[test]
    fn test_explicit_reset() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_secs(300));
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.reset();
        assert!(!breaker.is_open());
    }
}
