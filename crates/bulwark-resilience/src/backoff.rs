//! Retry delay scheduling
//!
//! Delay for attempt `n` (1-based) is `base * 2^(n-1)` plus uniform jitter
//! in `[0, base)`, so successive delays are strictly increasing. Rate-limited
//! outcomes skip the formula and wait what the governor says.

use bulwark_core::config::RetryConfig;
use bulwark_core::FailureClass;
use chrono::Utc;
use rand::Rng;
use std::time::Duration;

/// State threaded through one operation's retry loop
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub operation_id: String,
    /// Attempts made so far
    pub attempt: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub last_class: Option<FailureClass>,
    /// Wait handed out by the rate governor for the last `RateLimited`
    pub governed_wait: Option<Duration>,
}

impl RetryContext {
    pub fn new(operation_id: impl Into<String>, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            operation_id: operation_id.into(),
            attempt: 0,
            max_attempts,
            base_delay,
            last_class: None,
            governed_wait: None,
        }
    }
}

/// Scheduler decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Sleep this long, then attempt again
    Retry(Duration),
    /// Give up
    Stop,
}

/// Computes retry delays and enforces the attempt budget
#[derive(Debug, Clone)]
pub struct BackoffScheduler {
    max_attempts: u32,
    base_delay: Duration,
    jitter: bool,
}

impl BackoffScheduler {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter: true,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }

    /// Disable jitter (deterministic delays)
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Decide what happens after a failed attempt
    pub fn next_delay(&self, ctx: &RetryContext) -> Backoff {
        let class = match &ctx.last_class {
            Some(class) if class.is_retryable() => class,
            _ => return Backoff::Stop,
        };

        if ctx.attempt >= ctx.max_attempts {
            return Backoff::Stop;
        }

        if let FailureClass::RateLimited { reset_at } = class {
            let wait = ctx.governed_wait.unwrap_or_else(|| {
                reset_at
                    .signed_duration_since(Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            });
            return Backoff::Retry(wait);
        }

        let mut delay = exponential(ctx.base_delay, ctx.attempt);
        if self.jitter {
            delay += jitter(ctx.base_delay);
        }
        Backoff::Retry(delay)
    }
}

impl Default for BackoffScheduler {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// `base * 2^(attempt-1)`, saturating
pub fn exponential(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    base.saturating_mul(1u32 << exponent)
}

/// Uniform jitter in `[0, base)`
fn jitter(base: Duration) -> Duration {
    let nanos = base.as_nanos().min(u64::MAX as u128) as u64;
    if nanos == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..nanos))
}
