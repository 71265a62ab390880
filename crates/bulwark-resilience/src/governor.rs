//! Rate governance per dependency
//!
//! Tracks the last quota window each dependency reported and decides how
//! long to hold a call before issuing it. Dependencies that never reported
//! quota get a fixed minimum spacing between calls instead.

use bulwark_core::config::RateLimitConfig;
use bulwark_core::{Dependency, RateLimitWindow};
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct TrackedWindow {
    window: RateLimitWindow,
    /// Monotonic instant matching `window.reset_at`
    deadline: Instant,
}

#[derive(Debug, Clone, Default)]
struct DependencyRate {
    window: Option<TrackedWindow>,
    /// Whether quota data was ever recorded
    seen_data: bool,
    /// When the previous call was (or will be) issued
    last_call: Option<Instant>,
}

/// Decides pre-call waits from recorded quota windows
#[derive(Debug, Clone)]
pub struct RateGovernor {
    states: HashMap<Dependency, DependencyRate>,
    /// Longest single wait
    ceiling: Duration,
    /// Spacing for dependencies without quota data
    min_spacing: Duration,
}

impl RateGovernor {
    pub fn new(ceiling: Duration, min_spacing: Duration) -> Self {
        Self {
            states: HashMap::new(),
            ceiling,
            min_spacing,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.wait_ceiling(), config.min_spacing())
    }

    /// How long to wait before calling `dependency`; zero means proceed
    ///
    /// Assumes the call is issued once the returned wait has elapsed. An
    /// exhausted window is consumed by the wait it produces, so a single
    /// 429 never causes two governed sleeps.
    pub fn before_call(&mut self, dependency: Dependency) -> Duration {
        let now = Instant::now();
        let state = self.states.entry(dependency).or_default();
        let mut wait = Duration::ZERO;

        let exhausted_until = match &state.window {
            Some(tracked) if tracked.window.remaining == 0 && tracked.deadline > now => {
                Some(tracked.deadline)
            }
            _ => None,
        };

        if state.window.as_ref().is_some_and(|t| t.deadline <= now) {
            debug!("Discarding stale rate window for {}", dependency);
            state.window = None;
        } else if let Some(deadline) = exhausted_until {
            wait = (deadline - now).min(self.ceiling);
            debug!("Quota exhausted for {}; waiting {:?}", dependency, wait);
            state.window = None;
        } else if let Some(tracked) = state.window.as_mut() {
            tracked.window.remaining -= 1;
        } else if !state.seen_data {
            if let Some(last) = state.last_call {
                let next_allowed = last + self.min_spacing;
                if next_allowed > now {
                    wait = next_allowed - now;
                }
            }
        }

        state.last_call = Some(now + wait);
        wait
    }

    /// Refresh the window for `dependency` from a response
    ///
    /// Windows whose reset time already passed are dropped rather than
    /// trusted.
    pub fn record(&mut self, dependency: Dependency, window: RateLimitWindow) {
        let state = self.states.entry(dependency).or_default();
        state.seen_data = true;

        let until_reset = window.reset_at.signed_duration_since(Utc::now());
        match until_reset.to_std() {
            Ok(remaining) if !remaining.is_zero() => {
                state.window = Some(TrackedWindow {
                    deadline: Instant::now() + remaining,
                    window: RateLimitWindow {
                        dependency,
                        ..window
                    },
                });
            }
            _ => {
                debug!("Ignoring stale rate window for {}", dependency);
                state.window = None;
            }
        }
    }

    /// Last live window recorded for `dependency`
    pub fn window(&self, dependency: Dependency) -> Option<&RateLimitWindow> {
        self.states
            .get(&dependency)
            .and_then(|s| s.window.as_ref())
            .filter(|t| t.deadline > Instant::now())
            .map(|t| &t.window)
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
