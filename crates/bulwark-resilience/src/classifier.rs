//! Failure classification
//!
//! Every raw outcome is classified before anyone decides whether to retry.
//! This is also the only place that string-matches `git` stderr; when git or
//! GitHub change their wording, the marker tables below are the single
//! point to update (and bump [`PATTERN_VERSION`]).
//!
//! Rules, checked in order:
//!
//! | input | class |
//! |---|---|
//! | transport error, no status | `Retryable` |
//! | HTTP 429 | `RateLimited` (reset hint or default wait) |
//! | HTTP 408, 500, 502, 503, 504 | `Retryable` |
//! | HTTP 401, 403 | `AuthError` |
//! | other HTTP 4xx | `ClientError` |
//! | non-zero exit + `CONFLICT` or conflict markers | `GitConflict` |
//! | non-zero exit + protection markers | `BranchProtected` |
//! | non-zero exit + whitelisted transient marker | `Retryable` |
//! | any other failure | `ClientError` |
//!
//! A 403 whose body talks about rate limits is still an `AuthError`: a
//! missed retry is cheaper than hammering an auth failure that may lock the
//! token.

use bulwark_core::{FailureClass, RawResult};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Version of the marker tables below
pub const PATTERN_VERSION: u32 = 2;

/// HTTP statuses worth retrying
pub const RETRYABLE_STATUSES: [u16; 5] = [408, 500, 502, 503, 504];

/// HTTP statuses that mean the credentials were refused
pub const AUTH_STATUSES: [u16; 2] = [401, 403];

/// Lower-cased stderr markers of an unresolved merge conflict
pub const CONFLICT_MARKERS: &[&str] = &[
    "conflict (",
    "merge conflict in",
    "automatic merge failed",
    "<<<<<<< ",
];

/// Upper-case token git prints on every conflict line, matched case-sensitively
pub const CONFLICT_TOKEN: &str = "CONFLICT";

/// Lower-cased stderr markers of a branch protection rejection
pub const PROTECTION_MARKERS: &[&str] = &[
    "protected branch",
    "required status check",
    "gh006",
];

/// Lower-cased stderr markers of transient network trouble during git
/// transfer; callers opt in via `Operation::transient_on`
pub const GIT_TRANSIENT_MARKERS: &[&str] = &[
    "could not resolve host",
    "connection timed out",
    "connection reset",
    "operation timed out",
    "the remote end hung up unexpectedly",
    "early eof",
    "rpc failed",
    "the requested url returned error: 5",
];

/// Furthest a reset hint may lie in the future; larger hints are clamped
const MAX_RESET_HORIZON: Duration = Duration::from_secs(24 * 60 * 60);

/// Maps raw outcomes to [`FailureClass`]
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    /// Wait assumed for a 429 that carries no reset hint
    default_reset: Duration,
}

impl ErrorClassifier {
    pub fn new(default_reset: Duration) -> Self {
        Self { default_reset }
    }

    /// Classify a failed outcome; `None` when the outcome succeeded
    pub fn classify(&self, raw: &RawResult) -> Option<FailureClass> {
        self.classify_with(raw, &[], Utc::now())
    }

    /// Classify with caller-whitelisted transient stderr markers at `now`
    ///
    /// Pure: the result depends only on the arguments.
    pub fn classify_with(
        &self,
        raw: &RawResult,
        transient_markers: &[String],
        now: DateTime<Utc>,
    ) -> Option<FailureClass> {
        if raw.ok {
            return None;
        }

        if raw.http_status.is_none() {
            if let Some(err) = &raw.transport_error {
                return Some(FailureClass::Retryable {
                    reason: format!("transport error: {}", err),
                });
            }
        }

        if let Some(status) = raw.http_status {
            return Some(self.classify_status(status, raw, now));
        }

        if let Some(code) = raw.exit_code.filter(|code| *code != 0) {
            return Some(classify_exit(code, raw, transient_markers));
        }

        Some(FailureClass::ClientError {
            status: None,
            exit_code: raw.exit_code,
        })
    }

    fn classify_status(&self, status: u16, raw: &RawResult, now: DateTime<Utc>) -> FailureClass {
        if status == 429 {
            return FailureClass::RateLimited {
                reset_at: self.reset_hint(raw, now),
            };
        }
        if RETRYABLE_STATUSES.contains(&status) {
            return FailureClass::Retryable {
                reason: format!("HTTP {}", status),
            };
        }
        if AUTH_STATUSES.contains(&status) {
            return FailureClass::AuthError { status };
        }
        FailureClass::ClientError {
            status: Some(status),
            exit_code: None,
        }
    }

    /// `retry-after` wins, then a future window reset, then the default
    fn reset_hint(&self, raw: &RawResult, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(secs) = raw.retry_after_secs {
            return after(now, Duration::from_secs(secs));
        }
        if let Some(window) = raw.rate_limit.as_ref().filter(|w| w.reset_at > now) {
            return window.reset_at;
        }
        after(now, self.default_reset)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// `now + wait`, with `wait` clamped to [`MAX_RESET_HORIZON`]
fn after(now: DateTime<Utc>, wait: Duration) -> DateTime<Utc> {
    let wait = wait.min(MAX_RESET_HORIZON);
    chrono::Duration::from_std(wait)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now)
}

/// Classify with the default classifier
pub fn classify(raw: &RawResult) -> Option<FailureClass> {
    ErrorClassifier::default().classify(raw)
}

fn classify_exit(code: i32, raw: &RawResult, transient_markers: &[String]) -> FailureClass {
    let stderr = raw.stderr.as_deref().unwrap_or("");
    let lowered = stderr.to_lowercase();

    if stderr.contains(CONFLICT_TOKEN) || CONFLICT_MARKERS.iter().any(|m| lowered.contains(m)) {
        return FailureClass::GitConflict {
            files: conflicting_files(stderr),
        };
    }

    if PROTECTION_MARKERS.iter().any(|m| lowered.contains(m)) {
        return FailureClass::BranchProtected;
    }

    if let Some(marker) = transient_markers
        .iter()
        .find(|m| lowered.contains(m.to_lowercase().as_str()))
    {
        return FailureClass::Retryable {
            reason: format!("exit {}: {}", code, marker),
        };
    }

    FailureClass::ClientError {
        status: None,
        exit_code: Some(code),
    }
}

/// Extract conflicting paths from git output, in order, without duplicates
pub fn conflicting_files(output: &str) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();

    for line in output.lines() {
        let line = line.trim().trim_start_matches("remote:").trim();

        let candidate = if let Some(idx) = line.find("Merge conflict in ") {
            Some(line[idx + "Merge conflict in ".len()..].trim())
        } else if let Some(rest) = line.strip_prefix("both modified:") {
            Some(rest.trim())
        } else if line.starts_with("CONFLICT (") {
            // e.g. "CONFLICT (modify/delete): docs/old.md deleted in HEAD and modified in ..."
            line.split_once("): ")
                .and_then(|(_, rest)| rest.split_whitespace().next())
        } else if let Some(rest) = line.strip_prefix("CONFLICT:") {
            rest.split_whitespace().next()
        } else {
            None
        };

        if let Some(path) = candidate.filter(|p| !p.is_empty()) {
            if !files.iter().any(|f| f == path) {
                files.push(path.to_string());
            }
        }
    }

    files
}
