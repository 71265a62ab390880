//! Response to `RawResult` conversion, including quota headers
//!
//! GitHub reports quota as `x-ratelimit-{remaining,limit,reset}` with the
//! reset in epoch seconds. The AI provider uses
//! `anthropic-ratelimit-requests-{remaining,limit,reset}` with an RFC 3339
//! reset. Both may send `retry-after` in seconds.

use bulwark_core::{Dependency, RateLimitWindow, RawResult};
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::Response;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn number(headers: &HeaderMap, name: &str) -> Option<u64> {
    header(headers, name).and_then(|v| v.parse().ok())
}

/// Quota window from GitHub REST headers
pub fn github_rate_limit(headers: &HeaderMap) -> Option<RateLimitWindow> {
    let remaining = number(headers, "x-ratelimit-remaining")?;
    let limit = number(headers, "x-ratelimit-limit").unwrap_or(remaining);
    let reset = number(headers, "x-ratelimit-reset")?;
    let reset_at = DateTime::<Utc>::from_timestamp(i64::try_from(reset).ok()?, 0)?;

    Some(RateLimitWindow {
        dependency: Dependency::GithubApi,
        remaining,
        limit,
        reset_at,
    })
}

/// Quota window from AI provider headers
pub fn ai_rate_limit(headers: &HeaderMap) -> Option<RateLimitWindow> {
    let remaining = number(headers, "anthropic-ratelimit-requests-remaining")?;
    let limit = number(headers, "anthropic-ratelimit-requests-limit").unwrap_or(remaining);
    let reset_at = header(headers, "anthropic-ratelimit-requests-reset")
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())?
        .with_timezone(&Utc);

    Some(RateLimitWindow {
        dependency: Dependency::AiApi,
        remaining,
        limit,
        reset_at,
    })
}

/// `retry-after` in whole seconds
pub fn retry_after(headers: &HeaderMap) -> Option<u64> {
    number(headers, "retry-after")
}

/// Collapse a sent request into a `RawResult` for `dependency`
///
/// Errors before a status arrives become transport failures; a body that
/// cannot be read keeps the status with an empty body.
pub async fn into_raw(sent: reqwest::Result<Response>, dependency: Dependency) -> RawResult {
    let response = match sent {
        Ok(response) => response,
        Err(e) => return RawResult::transport(e.to_string()),
    };

    let status = response.status().as_u16();
    let headers = response.headers();
    let window = match dependency {
        Dependency::GithubApi => github_rate_limit(headers),
        Dependency::AiApi => ai_rate_limit(headers),
        Dependency::Git => None,
    };
    let wait = retry_after(headers);

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!("Failed to read {} response body: {}", dependency, e);
            String::new()
        }
    };

    let mut raw = RawResult::http(status, body);
    if let Some(window) = window {
        raw = raw.with_rate_limit(window);
    }
    if let Some(secs) = wait {
        raw = raw.with_retry_after(secs);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_github_window() {
        let map = headers(&[
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-limit", "5000"),
            ("x-ratelimit-reset", "1700000000"),
        ]);
        let window = github_rate_limit(&map).unwrap();
        assert_eq!(window.remaining, 0);
        assert_eq!(window.limit, 5000);
        assert_eq!(window.reset_at.timestamp(), 1_700_000_000);
        assert_eq!(window.dependency, Dependency::GithubApi);
    }

    #[test]
    fn test_github_window_requires_remaining_and_reset() {
        assert!(github_rate_limit(&headers(&[("x-ratelimit-limit", "5000")])).is_none());
        assert!(github_rate_limit(&headers(&[("x-ratelimit-remaining", "10")])).is_none());
        assert!(github_rate_limit(&headers(&[
            ("x-ratelimit-remaining", "ten"),
            ("x-ratelimit-reset", "1700000000"),
        ]))
        .is_none());
    }

    #[test]
    fn test_ai_window() {
        let map = headers(&[
            ("anthropic-ratelimit-requests-remaining", "3"),
            ("anthropic-ratelimit-requests-limit", "50"),
            ("anthropic-ratelimit-requests-reset", "2026-01-01T00:00:30Z"),
        ]);
        let window = ai_rate_limit(&map).unwrap();
        assert_eq!(window.remaining, 3);
        assert_eq!(window.limit, 50);
        assert_eq!(window.reset_at.to_rfc3339(), "2026-01-01T00:00:30+00:00");
        assert_eq!(window.dependency, Dependency::AiApi);
    }

    #[test]
    fn test_retry_after() {
        assert_eq!(retry_after(&headers(&[("retry-after", "17")])), Some(17));
        assert_eq!(
            retry_after(&headers(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")])),
            None
        );
    }
}
