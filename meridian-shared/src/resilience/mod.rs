//! Circuit breaker protecting outbound calls (external commerce APIs, the
//! message broker) from cascading into retry storms when a dependency is
//! degraded.

pub mod behavior;
pub mod metrics;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

pub use behavior::CircuitBreakerBehavior;
pub use metrics::{CircuitBreakerMetrics, MetricsCollector, PrometheusMetricsExporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct Counters {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU32,
    half_open_calls: AtomicU32,
    total_duration_nanos: AtomicU64,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            half_open_calls: AtomicU32::new(0),
            total_duration_nanos: AtomicU64::new(0),
        }
    }
}

/// Failure-threshold circuit breaker with a fixed cooldown before probing.
///
/// Closed -> Open after `failure_threshold` consecutive failures. Open ->
/// HalfOpen once `timeout` has elapsed since the last failure. HalfOpen ->
/// Closed after `success_threshold` consecutive successes, or back to Open
/// on any failure while probing.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    opened_at: Mutex<Option<Instant>>,
    counters: Counters,
}

impl CircuitBreaker {
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: RwLock::new(CircuitState::Closed),
            opened_at: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    fn transition_to_open(&self) {
        *self.state.write().unwrap() = CircuitState::Open;
        *self.opened_at.lock().unwrap() = Some(Instant::now());
        self.counters.half_open_calls.store(0, Ordering::Relaxed);
    }

    fn transition_to_half_open(&self) {
        *self.state.write().unwrap() = CircuitState::HalfOpen;
        self.counters.half_open_calls.store(0, Ordering::Relaxed);
    }

    fn transition_to_closed(&self) {
        *self.state.write().unwrap() = CircuitState::Closed;
        *self.opened_at.lock().unwrap() = None;
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
        self.counters.half_open_calls.store(0, Ordering::Relaxed);
    }

    pub fn record_success_manual(&self, duration: Duration) {
        self.record_success(duration);
    }

    pub fn record_failure_manual(&self, duration: Duration) {
        self.record_failure(duration);
    }
}

impl CircuitBreakerBehavior for CircuitBreaker {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        *self.state.read().unwrap()
    }

    fn should_allow(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                self.counters.half_open_calls.fetch_add(1, Ordering::Relaxed)
                    < self.config.success_threshold
            }
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .unwrap()
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.timeout {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
        }
    }

    fn record_success(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.success_count.fetch_add(1, Ordering::Relaxed);
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
        self.counters
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        if self.state() == CircuitState::HalfOpen
            && self.counters.half_open_calls.load(Ordering::Relaxed) >= self.config.success_threshold
        {
            self.transition_to_closed();
        }
    }

    fn record_failure(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.failure_count.fetch_add(1, Ordering::Relaxed);
        let consecutive = self.counters.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        match self.state() {
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Closed if consecutive >= self.config.failure_threshold => {
                self.transition_to_open()
            }
            _ => {}
        }
    }

    fn is_healthy(&self) -> bool {
        self.metrics().is_healthy()
    }

    fn force_open(&self) {
        self.transition_to_open();
    }

    fn force_closed(&self) {
        self.transition_to_closed();
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.counters.total_calls.load(Ordering::Relaxed);
        let success_count = self.counters.success_count.load(Ordering::Relaxed);
        let failure_count = self.counters.failure_count.load(Ordering::Relaxed);
        let total_duration = Duration::from_nanos(self.counters.total_duration_nanos.load(Ordering::Relaxed));

        CircuitBreakerMetrics {
            total_calls,
            success_count,
            failure_count,
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::Relaxed) as u64,
            half_open_calls: self.counters.half_open_calls.load(Ordering::Relaxed) as u64,
            total_duration,
            current_state: self.state(),
            failure_rate: if total_calls == 0 {
                0.0
            } else {
                failure_count as f64 / total_calls as f64
            },
            success_rate: if total_calls == 0 {
                0.0
            } else {
                success_count as f64 / total_calls as f64
            },
            average_duration: if total_calls == 0 {
                Duration::ZERO
            } else {
                total_duration / total_calls as u32
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, success_threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test".to_string(),
            CircuitBreakerConfig {
                failure_threshold,
                timeout,
                success_threshold,
            },
        )
    }

    #[test]
    fn opens_after_consecutive_failures() {
        let cb = breaker(3, 1, Duration::from_secs(60));
        assert_eq!(cb.state(), CircuitState::Closed);
        for _ in 0..3 {
            cb.record_failure(Duration::from_millis(1));
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow());
    }

    #[test]
    fn half_opens_after_timeout_then_closes_on_success() {
        let cb = breaker(1, 1, Duration::from_millis(10));
        cb.record_failure(Duration::from_millis(1));
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.should_allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(Duration::from_millis(1));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(1, 2, Duration::from_millis(10));
        cb.record_failure(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.should_allow());
        cb.record_failure(Duration::from_millis(1));
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn force_open_and_closed() {
        let cb = breaker(5, 2, Duration::from_secs(60));
        cb.force_open();
        assert!(!cb.should_allow());
        cb.force_closed();
        assert!(cb.should_allow());
    }
}
