//! Per-provider circuit breaker and rate limiter
//!
//! **Circuit breaker:** `CLOSED → OPEN → CLOSED`. Consecutive failures up to
//! the threshold open the circuit for a fixed cool-down; when the cool-down
//! expires the circuit closes and the failure counter resets, so the next
//! call is an ordinary attempt.
//!
//! **Rate limiter:** fixed request budget per 60 s window plus an
//! independent backoff timer. The backoff starts at 1 s, grows ×1.5 on
//! every limiter rejection or 429 (capped at 5 min) and halves on success
//! (floor 1 s).
//!
//! All methods take `now` explicitly and never await, so a caller holding a
//! lock around them gets an atomic check-then-act.

use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Resilience tuning shared by every provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthPolicy {
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub window: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_multiplier: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(5 * 60),
            window: Duration::from_secs(60),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(5 * 60),
            backoff_multiplier: 1.5,
        }
    }
}

/// Result of asking whether a provider may be called now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Call may proceed; one unit of the window budget was consumed
    Allowed,
    /// Circuit is open until the given instant
    CircuitOpen { until: Instant },
    /// A backoff from an earlier rejection is still running
    BackoffActive { until: Instant },
    /// Window budget is used up; a new backoff was started
    BudgetExhausted { until: Instant },
}

/// Health of one provider
#[derive(Debug, Clone)]
pub struct ProviderHealth {
    policy: HealthPolicy,
    budget: u32,
    consecutive_failures: u32,
    open_until: Option<Instant>,
    window_start: Option<Instant>,
    window_count: u32,
    backoff: Duration,
    backoff_until: Option<Instant>,
}

/// Read-only view for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealthSnapshot {
    pub name: String,
    pub circuit_open: bool,
    /// Remaining cool-down, when open
    pub cooldown_remaining_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub backoff_ms: u64,
    pub backoff_active: bool,
    pub window_count: u32,
    pub budget: u32,
}

impl ProviderHealth {
    pub fn new(budget: u32, policy: HealthPolicy) -> Self {
        Self {
            policy,
            budget: budget.max(1),
            consecutive_failures: 0,
            open_until: None,
            window_start: None,
            window_count: 0,
            backoff: policy.backoff_initial,
            backoff_until: None,
        }
    }

    /// Decide whether a call may go out now, consuming budget if it may
    pub fn admit(&mut self, now: Instant) -> Admission {
        if let Some(until) = self.open_until {
            if now < until {
                return Admission::CircuitOpen { until };
            }
            // Cool-down over: close optimistically
            self.open_until = None;
            self.consecutive_failures = 0;
        }

        if let Some(until) = self.backoff_until {
            if now < until {
                return Admission::BackoffActive { until };
            }
            self.backoff_until = None;
        }

        match self.window_start {
            Some(start) if now.duration_since(start) < self.policy.window => {}
            _ => {
                self.window_start = Some(now);
                self.window_count = 0;
            }
        }

        if self.window_count >= self.budget {
            let until = self.start_backoff(now);
            return Admission::BudgetExhausted { until };
        }

        self.window_count += 1;
        Admission::Allowed
    }

    /// Successful call: close the circuit and shrink the backoff
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
        self.backoff_until = None;
        self.backoff = (self.backoff / 2).max(self.policy.backoff_initial);
    }

    /// Failed call (not a rate-limit signal)
    ///
    /// Returns `true` when this failure opened the circuit.
    pub fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.policy.failure_threshold && self.open_until.is_none() {
            self.open_until = Some(now + self.policy.cooldown);
            return true;
        }
        false
    }

    /// Provider answered with a rate-limit signal; only the limiter reacts
    pub fn record_rate_limited(&mut self, now: Instant) -> Instant {
        self.start_backoff(now)
    }

    pub fn is_open(&self, now: Instant) -> bool {
        self.open_until.is_some_and(|until| now < until)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn snapshot(&self, name: &str, now: Instant) -> ProviderHealthSnapshot {
        let cooldown_remaining_ms = self
            .open_until
            .filter(|until| now < *until)
            .map(|until| until.duration_since(now).as_millis() as u64);

        ProviderHealthSnapshot {
            name: name.to_string(),
            circuit_open: cooldown_remaining_ms.is_some(),
            cooldown_remaining_ms,
            consecutive_failures: self.consecutive_failures,
            backoff_ms: self.backoff.as_millis() as u64,
            backoff_active: self.backoff_until.is_some_and(|until| now < until),
            window_count: self.window_count,
            budget: self.budget,
        }
    }

    /// Arm the backoff timer with the current delay, then grow the delay
    fn start_backoff(&mut self, now: Instant) -> Instant {
        let until = now + self.backoff;
        self.backoff_until = Some(until);
        self.backoff = self
            .backoff
            .mul_f64(self.policy.backoff_multiplier)
            .min(self.policy.backoff_max);
        until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(budget: u32) -> ProviderHealth {
        ProviderHealth::new(budget, HealthPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_threshold_and_recloses() {
        let mut h = health(100);
        let now = Instant::now();

        assert!(!h.record_failure(now));
        assert!(!h.record_failure(now));
        assert!(h.record_failure(now));
        assert!(matches!(h.admit(now), Admission::CircuitOpen { .. }));
        assert!(matches!(
            h.admit(now + Duration::from_secs(299)),
            Admission::CircuitOpen { .. }
        ));

        // Cool-down elapsed: ordinary attempt, counter reset
        assert_eq!(h.admit(now + Duration::from_secs(300)), Admission::Allowed);
        assert_eq!(h.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let mut h = health(100);
        let now = Instant::now();
        h.record_failure(now);
        h.record_failure(now);
        h.record_success();
        assert!(!h.record_failure(now));
        assert!(!h.is_open(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_window_and_backoff_growth() {
        let mut h = health(2);
        let now = Instant::now();

        assert_eq!(h.admit(now), Admission::Allowed);
        assert_eq!(h.admit(now), Admission::Allowed);

        // Third call in the window is rejected and arms a 1 s backoff
        let Admission::BudgetExhausted { until } = h.admit(now) else {
            panic!("expected budget rejection");
        };
        assert_eq!(until, now + Duration::from_secs(1));
        assert_eq!(h.backoff(), Duration::from_millis(1500));

        // Skips during an active backoff do not grow it
        assert!(matches!(
            h.admit(now + Duration::from_millis(500)),
            Admission::BackoffActive { .. }
        ));
        assert_eq!(h.backoff(), Duration::from_millis(1500));

        // Backoff over but the window is still full
        assert!(matches!(
            h.admit(now + Duration::from_secs(2)),
            Admission::BudgetExhausted { .. }
        ));
        assert_eq!(h.backoff(), Duration::from_millis(2250));

        // New window
        assert_eq!(h.admit(now + Duration::from_secs(61)), Admission::Allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped_and_halves_on_success() {
        let mut h = health(1);
        let now = Instant::now();
        for _ in 0..40 {
            h.record_rate_limited(now);
        }
        assert_eq!(h.backoff(), Duration::from_secs(300));

        h.record_success();
        assert_eq!(h.backoff(), Duration::from_secs(150));

        for _ in 0..20 {
            h.record_success();
        }
        assert_eq!(h.backoff(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_does_not_touch_circuit() {
        let mut h = health(10);
        let now = Instant::now();
        for _ in 0..5 {
            h.record_rate_limited(now);
        }
        assert_eq!(h.consecutive_failures(), 0);
        assert!(!h.is_open(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot() {
        let mut h = health(3);
        let now = Instant::now();
        h.admit(now);
        for _ in 0..3 {
            h.record_failure(now);
        }

        let snapshot = h.snapshot("gemini", now + Duration::from_secs(60));
        assert!(snapshot.circuit_open);
        assert_eq!(snapshot.cooldown_remaining_ms, Some(240_000));
        assert_eq!(snapshot.consecutive_failures, 3);
        assert_eq!(snapshot.window_count, 1);
        assert_eq!(snapshot.budget, 3);
    }
}
