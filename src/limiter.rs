// src/limiter.rs
//! Per-source pacing. Every source owns an independent token budget with a
//! minimum inter-request interval, an optional burst allowance, and an
//! adaptive multiplier that widens the interval while a source keeps failing.
//!
//! `acquire` never errors and never blocks other sources' budgets; callers
//! that need cancellation race it against their shutdown signal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Per-source state. Requests are never issued before the budget yields
/// a token; the multiplier is mutated only through `record`.
#[derive(Debug)]
struct RateBudget {
    min_interval: Duration,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    multiplier: f64,
    ceiling: f64,
}

impl RateBudget {
    fn new(min_interval: Duration, burst: u32, ceiling: f64) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            min_interval,
            capacity,
            // Full bucket at start so the first poll is not delayed.
            tokens: capacity,
            last_refill: Instant::now(),
            multiplier: 1.0,
            ceiling,
        }
    }

    fn effective_interval(&self) -> Duration {
        self.min_interval.mul_f64(self.multiplier)
    }

    fn refill(&mut self, now: Instant) {
        let interval = self.effective_interval();
        if interval.is_zero() {
            self.tokens = self.capacity;
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() / interval.as_secs_f64()).min(self.capacity);
        self.last_refill = now;
    }
}

/// Shared pacing state for all sources. Cheap to clone via `Arc`.
#[derive(Debug)]
pub struct PaceLimiter {
    defaults: RateLimitConfig,
    budgets: Mutex<HashMap<String, Arc<Mutex<RateBudget>>>>,
}

impl PaceLimiter {
    pub fn new(defaults: RateLimitConfig) -> Self {
        Self {
            defaults,
            budgets: Mutex::new(HashMap::new()),
        }
    }

    /// Register a source with optional per-source overrides. Idempotent;
    /// unknown sources fall back to the defaults on first `acquire`.
    pub fn register(&self, source: &str, min_interval: Option<Duration>, burst: Option<u32>) {
        let budget = RateBudget::new(
            min_interval.unwrap_or(Duration::from_millis(self.defaults.min_interval_ms)),
            burst.unwrap_or(self.defaults.burst),
            self.defaults.failure_multiplier_ceiling,
        );
        let mut map = self.budgets.lock().expect("limiter map mutex poisoned");
        map.insert(source.to_string(), Arc::new(Mutex::new(budget)));
    }

    fn budget_for(&self, source: &str) -> Arc<Mutex<RateBudget>> {
        let mut map = self.budgets.lock().expect("limiter map mutex poisoned");
        map.entry(source.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RateBudget::new(
                    Duration::from_millis(self.defaults.min_interval_ms),
                    self.defaults.burst,
                    self.defaults.failure_multiplier_ceiling,
                )))
            })
            .clone()
    }

    /// Wait until the source's budget permits a request, then consume a token.
    /// Only this source's budget is touched; other sources proceed freely.
    pub async fn acquire(&self, source: &str) {
        let budget = self.budget_for(source);
        loop {
            let wait = {
                let mut b = budget.lock().expect("rate budget mutex poisoned");
                let now = Instant::now();
                b.refill(now);
                if b.tokens >= 1.0 {
                    b.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - b.tokens;
                b.effective_interval().mul_f64(deficit)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Feed a request outcome back into the budget: success halves the
    /// adaptive multiplier (floor 1.0), failure doubles it up to the ceiling.
    pub fn record(&self, source: &str, success: bool) {
        let budget = self.budget_for(source);
        let mut b = budget.lock().expect("rate budget mutex poisoned");
        if success {
            b.multiplier = (b.multiplier / 2.0).max(1.0);
        } else {
            b.multiplier = (b.multiplier * 2.0).min(b.ceiling);
        }
    }

    /// Current effective interval, for diagnostics.
    pub fn effective_interval(&self, source: &str) -> Duration {
        let budget = self.budget_for(source);
        let b = budget.lock().expect("rate budget mutex poisoned");
        b.effective_interval()
    }
}
