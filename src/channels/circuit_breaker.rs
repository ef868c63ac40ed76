use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub max_failures: u32,
    pub recovery_timeout: Duration,
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_failures: 5,
            recovery_timeout: Duration::from_secs(30),
            half_open_max_requests: 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub total_successes: u64,
    pub total_failures: u64,
    pub consecutive_failures: u32,
    pub last_transition: Option<Instant>,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_in_flight: u32,
    last_failure_at: Option<Instant>,
    last_transition: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
}

/// A three-state gate wrapping one sender to fail fast when a provider is
/// unhealthy. `allow`/`record_success`/`record_failure` mirror the contract
/// in a message-broker resilience module: the caller consults `allow`
/// before the call and reports the outcome afterward.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_in_flight: 0,
                last_failure_at: None,
                last_transition: None,
                total_successes: 0,
                total_failures: 0,
            }),
        }
    }

    /// Returns whether a call may proceed. Transitions `open -> half-open`
    /// once `recovery_timeout` has elapsed, admitting at most
    /// `half_open_max_requests` concurrent probes.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 0;
                    inner.last_transition = Some(Instant::now());
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_requests {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_successes += 1;
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                // A single successful probe closes the breaker.
                // `half_open_max_requests` bounds how many probes `allow`
                // admits concurrently, not how many must succeed.
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.last_transition = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.total_failures += 1;
        inner.last_failure_at = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.max_failures {
                    inner.state = CircuitState::Open;
                    inner.last_transition = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.state = CircuitState::Open;
                inner.last_transition = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock().unwrap();
        CircuitBreakerStats {
            state: inner.state,
            total_successes: inner.total_successes,
            total_failures: inner.total_failures,
            consecutive_failures: inner.consecutive_failures,
            last_transition: inner.last_transition,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(max_failures: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            max_failures,
            recovery_timeout: Duration::from_millis(20),
            half_open_max_requests: 1,
        })
    }

    #[test]
    fn opens_after_max_consecutive_failures() {
        let cb = breaker(3);
        assert_eq!(cb.state(), CircuitState::Closed);
        for _ in 0..2 {
            assert!(cb.allow());
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow());
    }

    #[test]
    fn success_in_closed_resets_consecutive_failures() {
        let cb = breaker(3);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_success_closes_breaker() {
        let cb = breaker(1);
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_closes_on_first_success_even_with_multiple_admitted_probes() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            max_failures: 1,
            recovery_timeout: Duration::from_millis(20),
            half_open_max_requests: 3,
        });
        assert!(cb.allow());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens_breaker() {
        let cb = breaker(1);
        assert!(cb.allow());
        cb.record_failure();

        std::thread::sleep(Duration::from_millis(30));
        assert!(cb.allow());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
