// src/retry.rs
//! Retry decisions as an explicit state machine: given the outcome of one
//! attempt, return either a delay to wait before the next attempt or a
//! terminal give-up. The backoff curve itself is pure so it can be tested
//! without real sleeps; jitter is applied on top by the caller-facing API.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Outcome of a single request within one logical fetch. Not persisted;
/// consumed by `RetryPolicy::decide` and logged.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub url: String,
    /// 1-based attempt number.
    pub attempt: u32,
    pub outcome: Result<u16, FetchError>,
    pub latency: Duration,
    /// `Retry-After` hint supplied by the server, if any.
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_frac: f64,
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter_frac: cfg.jitter_frac.clamp(0.0, 1.0),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Classify an attempt outcome. `GiveUp` is terminal: non-transient
    /// errors give up immediately, and nothing retries past `max_attempts`.
    pub fn decide(&self, attempt: &FetchAttempt) -> RetryDecision {
        let err = match &attempt.outcome {
            Ok(_) => return RetryDecision::GiveUp, // nothing to retry
            Err(e) => e,
        };
        if !err.is_transient() || attempt.attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        // A server-supplied hint overrides the computed curve, capped at the
        // configured maximum. No jitter on hints: the server picked the time.
        let delay = match attempt.retry_after {
            Some(hint) => hint.min(self.max_delay),
            None => self.jittered(self.backoff_delay(attempt.attempt)),
        };
        RetryDecision::RetryAfter(delay)
    }

    /// Un-jittered exponential backoff: `base × 2^(attempt-1)`, capped.
    /// Pure function of the attempt number.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let raw = self.base_delay.saturating_mul(1u32 << shift);
        raw.min(self.max_delay)
    }

    /// Apply ± `jitter_frac` so retries across sources sharing a host do not
    /// synchronize.
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_frac == 0.0 {
            return delay;
        }
        let factor = rand::rng().random_range(1.0 - self.jitter_frac..=1.0 + self.jitter_frac);
        delay.mul_f64(factor).min(self.max_delay)
    }

    /// Lower bound of a jittered delay, for timing assertions in tests.
    pub fn min_jittered(&self, attempt: u32) -> Duration {
        self.backoff_delay(attempt).mul_f64(1.0 - self.jitter_frac)
    }
}
