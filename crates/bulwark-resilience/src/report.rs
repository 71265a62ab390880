//! Human-readable failure reports
//!
//! Reports name what was attempted, why it failed and what to do next.
//! Everything returned here is already scrubbed.

use bulwark_core::{BulwarkError, FailureClass, SecretSanitizer};

use crate::invoker::InvokeError;

/// Longest raw diagnostic carried into a report
const MAX_DETAIL_CHARS: usize = 2000;

/// Render a failed invocation for PR comments, job summaries or artifacts
pub fn render_failure(attempted: &str, err: &InvokeError, sanitizer: &SecretSanitizer) -> String {
    let mut lines = vec![format!("Attempted: {}", attempted)];

    match err {
        InvokeError::CircuitOpen {
            dependency,
            retry_in,
            ..
        } => {
            lines.push(format!(
                "Reason: {} service currently degraded, try later",
                dependency
            ));
            lines.push(format!(
                "Next step: re-run in about {}s; this call was not sent",
                retry_in.as_secs().max(1)
            ));
        }
        InvokeError::Failed(failure) => {
            lines.push(format!("Reason: {} ({})", failure.class, failure.dependency));
            if failure.exhausted {
                lines.push(format!(
                    "Gave up after {} attempts (waited {}s in total)",
                    failure.attempts,
                    failure.total_wait.as_secs()
                ));
            }
            lines.push(format!("Next step: {}", failure.class.remediation()));
            if !failure.diagnostic.is_empty() {
                lines.push(String::new());
                lines.push("Details:".to_string());
                lines.push(truncate(&failure.diagnostic, MAX_DETAIL_CHARS));
            }
        }
    }

    sanitizer.scrub(&lines.join("\n"))
}

/// Render an error raised before any outbound call, e.g. missing credentials
pub fn render_preflight(attempted: &str, err: &BulwarkError, sanitizer: &SecretSanitizer) -> String {
    let class = err.failure_class().unwrap_or_else(|| FailureClass::Fatal {
        message: err.to_string(),
    });
    sanitizer.scrub(&format!(
        "Attempted: {}\nReason: {}\nNext step: {}",
        attempted,
        class,
        class.remediation()
    ))
}

/// Render the "conflicts need a human" report
pub fn render_conflict(attempted: &str, files: &[String], sanitizer: &SecretSanitizer) -> String {
    let listed = if files.is_empty() {
        "  (git did not name the files)".to_string()
    } else {
        files
            .iter()
            .map(|f| format!("  - {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };

    sanitizer.scrub(&format!(
        "Attempted: {}\nReason: merge conflicts\n{}\nNext step: resolve the conflicts manually and re-run",
        attempted, listed
    ))
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... (truncated)", &text[..idx]),
        None => text.to_string(),
    }
}
