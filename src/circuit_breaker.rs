//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for AI oracle calls,
//! plus the jittered exponential delay used between oracle retries.
//! While the circuit is open the pipeline skips the oracle entirely and
//! continues with the deterministic parsers.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::pipeline_config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for oracle calls
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold reached, requests fail fast
/// - **Half-Open**: Reset timeout elapsed; the next call is let through and
///   its outcome closes or re-opens the circuit
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rescue_intake::circuit_breaker::CircuitBreaker;
    /// use rescue_intake::pipeline_config::RecoveryConfig;
    ///
    /// let circuit_breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!circuit_breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    // A panic while holding the lock cannot leave the counters inconsistent
    fn state(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if the circuit is open (blocking requests)
    ///
    /// Returns `true` when the failure count has reached the threshold and
    /// the reset timeout has not elapsed since the last failure.
    pub fn is_open(&self) -> bool {
        let mut state = self.state();
        if state.failure_count < self.config.circuit_breaker_threshold {
            return false;
        }
        match state.last_failure_time {
            Some(last_time)
                if last_time.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs) =>
            {
                true
            }
            _ => {
                // Half-open: allow one attempt through
                state.failure_count = self.config.circuit_breaker_threshold.saturating_sub(1);
                state.last_failure_time = None;
                false
            }
        }
    }

    /// Record a failed oracle call
    pub fn record_failure(&self) {
        let mut state = self.state();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful oracle call, closing the circuit
    pub fn record_success(&self) {
        let mut state = self.state();
        state.failure_count = 0;
        state.last_failure_time = None;
    }

    pub fn failure_count(&self) -> u32 {
        self.state().failure_count
    }
}

/// Delay before retry number `attempt` (0-based): exponential backoff from
/// `base_retry_delay_ms`, capped at `max_retry_delay_ms`, with up to 25%
/// random jitter added below the cap.
pub fn calculate_retry_delay(config: &RecoveryConfig, attempt: u32) -> Duration {
    let exponential = config
        .base_retry_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    let capped = exponential.min(config.max_retry_delay_ms);
    let jitter_range = capped / 4;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..=jitter_range)
    } else {
        0
    };
    Duration::from_millis(capped.saturating_add(jitter).min(config.max_retry_delay_ms))
}
