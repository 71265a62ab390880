//! Resilient invocation of outbound calls
//!
//! Every outbound call is described by an [`Operation`] and handed to
//! [`ResilientInvoker::call`], together with the run's
//! [`ResilienceContext`]. Per attempt the invoker:
//!
//! 1. asks the circuit breaker (open circuit: fail fast, no attempt spent;
//!    a circuit tripped by this operation's own failure ends it with that
//!    failure instead)
//! 2. asks the rate governor and sleeps the returned wait
//! 3. executes the call and classifies the raw outcome
//! 4. returns terminal failures immediately; only transient ones reach the
//!    backoff scheduler
//!
//! Attempts of one operation are strictly sequential.

use bulwark_core::{
    BulwarkConfig, Dependency, FailureClass, OperationKind, RateLimitWindow, RawResult,
    SecretSanitizer,
};
use chrono::Utc;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffScheduler, RetryContext};
use crate::circuit_breaker::{CircuitBreaker, CircuitStatus};
use crate::classifier::ErrorClassifier;
use crate::governor::RateGovernor;

/// One outbound call, described at the call site
pub struct Operation<F> {
    id: String,
    dependency: Dependency,
    kind: OperationKind,
    transient_markers: Vec<String>,
    execute: F,
}

impl<F, Fut> Operation<F>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RawResult>,
{
    /// Create an operation with a fresh id
    pub fn new(dependency: Dependency, kind: OperationKind, execute: F) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            dependency,
            kind,
            transient_markers: Vec::new(),
            execute,
        }
    }

    /// Use a descriptive id instead of a UUID
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Treat failed exits whose stderr contains one of `markers` as transient
    pub fn transient_on(mut self, markers: &[&str]) -> Self {
        self.transient_markers
            .extend(markers.iter().map(|m| m.to_string()));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl<F> fmt::Debug for Operation<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("dependency", &self.dependency)
            .field("kind", &self.kind)
            .field("transient_markers", &self.transient_markers)
            .finish()
    }
}

/// Per-run mutable resilience state, keyed by dependency
///
/// Lives for the process lifetime; nothing is shared across processes.
/// Only the invoker mutates it.
#[derive(Debug, Clone, Default)]
pub struct ResilienceContext {
    governor: RateGovernor,
    breaker: CircuitBreaker,
}

impl ResilienceContext {
    pub fn new(governor: RateGovernor, breaker: CircuitBreaker) -> Self {
        Self { governor, breaker }
    }

    pub fn from_config(config: &BulwarkConfig) -> Self {
        Self::new(
            RateGovernor::from_config(&config.rate_limit),
            CircuitBreaker::from_config(&config.circuit),
        )
    }

    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// Successful invocation
#[derive(Debug, Clone)]
pub struct Success {
    pub operation_id: String,
    pub result: RawResult,
    pub attempts: u32,
    /// Governor waits plus backoff sleeps
    pub total_wait: Duration,
    /// Backoff sleeps between attempts, in order
    pub retry_delays: Vec<Duration>,
}

/// Failure after classification
#[derive(Debug, Clone)]
pub struct ClassifiedFailure {
    pub operation_id: String,
    pub dependency: Dependency,
    pub class: FailureClass,
    pub attempts: u32,
    pub total_wait: Duration,
    pub retry_delays: Vec<Duration>,
    /// The retry budget ran out on a transient failure
    pub exhausted: bool,
    /// Sanitized raw diagnostic of the last attempt
    pub diagnostic: String,
}

impl fmt::Display for ClassifiedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} call {} failed after {} attempt(s): {}",
            self.dependency, self.operation_id, self.attempts, self.class
        )?;
        if !self.diagnostic.is_empty() {
            write!(f, ": {}", self.diagnostic)?;
        }
        Ok(())
    }
}

/// Invocation error
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    /// The dependency's circuit is open; no attempt was made
    #[error("{dependency} is currently degraded (circuit open); try again in {}s", retry_in.as_secs())]
    CircuitOpen {
        operation_id: String,
        dependency: Dependency,
        retry_in: Duration,
    },

    #[error("{0}")]
    Failed(ClassifiedFailure),
}

impl InvokeError {
    /// Classified failure, `None` for a circuit rejection
    pub fn class(&self) -> Option<&FailureClass> {
        match self {
            InvokeError::Failed(failure) => Some(&failure.class),
            InvokeError::CircuitOpen { .. } => None,
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, InvokeError::CircuitOpen { .. })
    }

    pub fn dependency(&self) -> Dependency {
        match self {
            InvokeError::Failed(failure) => failure.dependency,
            InvokeError::CircuitOpen { dependency, .. } => *dependency,
        }
    }
}

/// Classify-then-decide executor for outbound calls
#[derive(Debug, Clone, Default)]
pub struct ResilientInvoker {
    scheduler: BackoffScheduler,
    classifier: ErrorClassifier,
    sanitizer: SecretSanitizer,
}

impl ResilientInvoker {
    pub fn new(
        scheduler: BackoffScheduler,
        classifier: ErrorClassifier,
        sanitizer: SecretSanitizer,
    ) -> Self {
        Self {
            scheduler,
            classifier,
            sanitizer,
        }
    }

    pub fn from_config(config: &BulwarkConfig, sanitizer: SecretSanitizer) -> Self {
        Self::new(
            BackoffScheduler::from_config(&config.retry),
            ErrorClassifier::new(config.rate_limit.default_reset()),
            sanitizer,
        )
    }

    pub fn sanitizer(&self) -> &SecretSanitizer {
        &self.sanitizer
    }

    pub fn scheduler(&self) -> &BackoffScheduler {
        &self.scheduler
    }

    /// Run `op` resiliently
    pub async fn call<F, Fut>(
        &self,
        ctx: &mut ResilienceContext,
        mut op: Operation<F>,
    ) -> Result<Success, InvokeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RawResult>,
    {
        let dependency = op.dependency;
        let mut retry = RetryContext::new(
            op.id.clone(),
            self.scheduler.max_attempts(),
            self.scheduler.base_delay(),
        );
        let mut total_wait = Duration::ZERO;
        let mut retry_delays = Vec::new();

        loop {
            if !ctx.breaker.allow(dependency) {
                let retry_in = ctx.breaker.time_until_retry(dependency);
                warn!(
                    operation = %op.id,
                    dependency = %dependency,
                    attempt = retry.attempt + 1,
                    outcome = "circuit_open",
                    "Call rejected; retry in {}s",
                    retry_in.as_secs()
                );
                return Err(InvokeError::CircuitOpen {
                    operation_id: op.id.clone(),
                    dependency,
                    retry_in,
                });
            }

            let wait = ctx.governor.before_call(dependency);
            if !wait.is_zero() {
                debug!("Rate governor holding {} call for {:?}", dependency, wait);
                tokio::time::sleep(wait).await;
                total_wait += wait;
            }

            retry.attempt += 1;
            let raw = (op.execute)().await;

            if let Some(window) = raw.rate_limit.clone() {
                ctx.governor.record(dependency, window);
            }

            let class = match self
                .classifier
                .classify_with(&raw, &op.transient_markers, Utc::now())
            {
                None => {
                    ctx.breaker.on_result(dependency, true);
                    info!(
                        operation = %op.id,
                        dependency = %dependency,
                        kind = %op.kind,
                        attempt = retry.attempt,
                        outcome = "ok",
                        "Attempt succeeded"
                    );
                    return Ok(Success {
                        operation_id: op.id.clone(),
                        result: raw,
                        attempts: retry.attempt,
                        total_wait,
                        retry_delays,
                    });
                }
                Some(class) => class,
            };

            ctx.breaker.on_result(dependency, false);
            let diagnostic = self.sanitizer.scrub(&raw.diagnostic());
            warn!(
                operation = %op.id,
                dependency = %dependency,
                kind = %op.kind,
                attempt = retry.attempt,
                outcome = class.label(),
                "Attempt failed: {}",
                self.sanitizer.scrub(&format!("{}: {}", class, diagnostic))
            );

            retry.governed_wait = None;
            if let FailureClass::RateLimited { reset_at } = &class {
                ctx.governor.record(
                    dependency,
                    RateLimitWindow {
                        dependency,
                        remaining: 0,
                        limit: raw.rate_limit.as_ref().map(|w| w.limit).unwrap_or(0),
                        reset_at: *reset_at,
                    },
                );
                retry.governed_wait = Some(ctx.governor.before_call(dependency));
            }

            let terminal = !class.is_retryable();
            retry.last_class = Some(class.clone());

            let failure = |exhausted: bool, total_wait: Duration, retry_delays: Vec<Duration>| {
                InvokeError::Failed(ClassifiedFailure {
                    operation_id: op.id.clone(),
                    dependency,
                    class: class.clone(),
                    attempts: retry.attempt,
                    total_wait,
                    retry_delays,
                    exhausted,
                    diagnostic: diagnostic.clone(),
                })
            };

            if terminal {
                return Err(failure(false, total_wait, retry_delays));
            }

            // This failure tripped the circuit; report it rather than a rejection
            if ctx.breaker.status(dependency) == CircuitStatus::Open {
                warn!(
                    "{} call {} stopped after {} attempt(s): circuit opened",
                    dependency, op.id, retry.attempt
                );
                return Err(failure(false, total_wait, retry_delays));
            }

            match self.scheduler.next_delay(&retry) {
                Backoff::Stop => {
                    warn!(
                        "{} call {} exhausted {} attempts",
                        dependency, op.id, retry.attempt
                    );
                    return Err(failure(true, total_wait, retry_delays));
                }
                Backoff::Retry(delay) => {
                    debug!(
                        "Retrying {} call {} in {:?} (attempt {}/{})",
                        dependency,
                        op.id,
                        delay,
                        retry.attempt + 1,
                        retry.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    total_wait += delay;
                    retry_delays.push(delay);
                }
            }
        }
    }
}
