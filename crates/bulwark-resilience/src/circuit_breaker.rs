//! Circuit breaker per dependency
//!
//! Implements the circuit breaker pattern to stop calling a dependency that
//! keeps failing, instead of burning the job's time on retries.
//!
//! # States
//!
//! - **Closed**: Normal operation, all calls allowed
//! - **Open**: Too many consecutive failures, calls rejected until the
//!   cool-down elapses
//! - **HalfOpen**: Cool-down elapsed, exactly one probe call allowed
//!
//! Transitions: `Closed -> Open` at the failure threshold, `Open -> HalfOpen`
//! after the cool-down, `HalfOpen -> Closed` on one success, `HalfOpen -> Open`
//! on one failure (cool-down doubled up to the ceiling).

use bulwark_core::config::CircuitConfig;
use bulwark_core::Dependency;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitStatus {
    /// Normal operation - calls allowed
    Closed,
    /// Too many failures - reject calls immediately
    Open,
    /// Testing recovery - allow one call
    HalfOpen,
}

/// Health state of one dependency
#[derive(Debug, Clone)]
pub struct CircuitState {
    pub status: CircuitStatus,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
    pub cool_down: Duration,
    probe_in_flight: bool,
}

impl CircuitState {
    fn closed(cool_down: Duration) -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_failures: 0,
            opened_at: None,
            cool_down,
            probe_in_flight: false,
        }
    }

    fn cool_down_elapsed(&self, now: Instant) -> bool {
        self.opened_at
            .map(|opened| now.saturating_duration_since(opened) >= self.cool_down)
            .unwrap_or(true)
    }
}

/// Per-dependency circuit breakers
///
/// # Example
///
/// ```
/// use bulwark_core::Dependency;
/// use bulwark_resilience::CircuitBreaker;
/// use std::time::Duration;
///
/// let mut cb = CircuitBreaker::new(3, Duration::from_secs(60), Duration::from_secs(600));
///
/// for _ in 0..3 {
///     cb.on_result(Dependency::AiApi, false);
/// }
///
/// assert!(!cb.allow(Dependency::AiApi));
/// assert!(cb.allow(Dependency::GithubApi));
/// ```
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    circuits: HashMap<Dependency, CircuitState>,
    threshold: u32,
    base_cool_down: Duration,
    cool_down_ceiling: Duration,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    ///
    /// # Arguments
    ///
    /// * `threshold` - Consecutive failures before a circuit opens
    /// * `cool_down` - Initial open period before a probe is allowed
    /// * `cool_down_ceiling` - Cap for the doubled cool-down on repeated trips
    pub fn new(threshold: u32, cool_down: Duration, cool_down_ceiling: Duration) -> Self {
        Self {
            circuits: HashMap::new(),
            threshold: threshold.max(1),
            base_cool_down: cool_down,
            cool_down_ceiling: cool_down_ceiling.max(cool_down),
        }
    }

    pub fn from_config(config: &CircuitConfig) -> Self {
        Self::new(
            config.failure_threshold,
            config.cool_down(),
            config.cool_down_ceiling(),
        )
    }

    fn circuit(&mut self, dependency: Dependency) -> &mut CircuitState {
        let base = self.base_cool_down;
        self.circuits
            .entry(dependency)
            .or_insert_with(|| CircuitState::closed(base))
    }

    /// Check whether a call to `dependency` may proceed
    ///
    /// Moves an open circuit to half-open once its cool-down elapsed, and
    /// hands out the single half-open probe.
    pub fn allow(&mut self, dependency: Dependency) -> bool {
        let now = Instant::now();
        let circuit = self.circuit(dependency);

        match circuit.status {
            CircuitStatus::Closed => true,
            CircuitStatus::Open => {
                if circuit.cool_down_elapsed(now) {
                    info!("Circuit for {} half-open; allowing one probe", dependency);
                    circuit.status = CircuitStatus::HalfOpen;
                    circuit.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitStatus::HalfOpen => {
                if circuit.probe_in_flight {
                    false
                } else {
                    circuit.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record the outcome of a call to `dependency`
    pub fn on_result(&mut self, dependency: Dependency, success: bool) {
        let now = Instant::now();
        let threshold = self.threshold;
        let base = self.base_cool_down;
        let ceiling = self.cool_down_ceiling;
        let circuit = self.circuit(dependency);

        match (circuit.status, success) {
            (CircuitStatus::Closed, true) => {
                circuit.consecutive_failures = 0;
            }
            (CircuitStatus::Closed, false) => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= threshold {
                    warn!(
                        "Circuit for {} OPEN after {} consecutive failures (cool-down {:?})",
                        dependency, circuit.consecutive_failures, circuit.cool_down
                    );
                    circuit.status = CircuitStatus::Open;
                    circuit.opened_at = Some(now);
                } else {
                    debug!(
                        "Circuit for {}: recorded failure (count: {})",
                        dependency, circuit.consecutive_failures
                    );
                }
            }
            (CircuitStatus::HalfOpen, true) => {
                info!("Circuit for {} closed after successful probe", dependency);
                *circuit = CircuitState::closed(base);
            }
            (CircuitStatus::HalfOpen, false) => {
                circuit.consecutive_failures += 1;
                circuit.cool_down = (circuit.cool_down * 2).min(ceiling);
                circuit.status = CircuitStatus::Open;
                circuit.opened_at = Some(now);
                circuit.probe_in_flight = false;
                warn!(
                    "Circuit for {} re-opened after failed probe (cool-down {:?})",
                    dependency, circuit.cool_down
                );
            }
            (CircuitStatus::Open, _) => {
                // Calls are never issued while open; a late result changes nothing.
                debug!("Ignoring result for {} while circuit is open", dependency);
            }
        }
    }

    /// Current status, without triggering transitions
    pub fn status(&self, dependency: Dependency) -> CircuitStatus {
        match self.circuits.get(&dependency) {
            None => CircuitStatus::Closed,
            Some(c) if c.status == CircuitStatus::Open && c.cool_down_elapsed(Instant::now()) => {
                CircuitStatus::HalfOpen
            }
            Some(c) => c.status,
        }
    }

    /// Snapshot of a dependency's circuit, if it was ever used
    pub fn state(&self, dependency: Dependency) -> Option<&CircuitState> {
        self.circuits.get(&dependency)
    }

    /// Consecutive failures recorded for `dependency` (for monitoring)
    pub fn failure_count(&self, dependency: Dependency) -> u32 {
        self.circuits
            .get(&dependency)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
    }

    /// Time until `dependency` can be probed, zero if not open
    pub fn time_until_retry(&self, dependency: Dependency) -> Duration {
        match self.circuits.get(&dependency) {
            Some(c) if c.status == CircuitStatus::Open => {
                let elapsed = c
                    .opened_at
                    .map(|opened| Instant::now().saturating_duration_since(opened))
                    .unwrap_or(c.cool_down);
                c.cool_down.saturating_sub(elapsed)
            }
            // Closed and HalfOpen can be called immediately
            _ => Duration::ZERO,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::from_config(&CircuitConfig::default())
    }
}
