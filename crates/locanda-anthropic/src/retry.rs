// SPDX-FileCopyrightText: 2026 Locanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backoff policy for transient provider failures.

use std::time::Duration;

use rand::Rng;

/// Retry policy: exponential backoff with jitter, bounded by `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fractional jitter, e.g. 0.2 for plus or minus 20 percent.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

/// Rate limits and server errors are worth retrying.
pub(crate) fn should_retry_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Transport failures worth retrying: timeouts and connection errors.
pub(crate) fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Delay before the next attempt. A server `Retry-After` hint wins;
/// otherwise exponential backoff from `base_delay` with jitter applied.
pub(crate) fn retry_delay(
    cfg: &RetryConfig,
    attempt: u32,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(hint) = retry_after {
        if hint > Duration::ZERO {
            return hint;
        }
    }

    let exp = cfg.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
    let capped = exp.min(cfg.max_delay.as_secs_f64());
    let jitter = 1.0 + rand::thread_rng().gen_range(-cfg.jitter..=cfg.jitter);
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

/// Parses a `Retry-After` header value: either integer seconds or an HTTP
/// date.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(when) = chrono::DateTime::parse_from_rfc2822(value) {
        let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(delay) = delta.to_std() {
            return Some(delay);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_rate_limit_and_server_errors() {
        assert!(should_retry_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        assert!(should_retry_status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(!should_retry_status(reqwest::StatusCode::BAD_REQUEST));
        assert!(!should_retry_status(reqwest::StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn delay_grows_exponentially_within_bounds() {
        let cfg = RetryConfig {
            jitter: 0.0,
            ..RetryConfig::default()
        };
        assert_eq!(retry_delay(&cfg, 0, None), Duration::from_secs(1));
        assert_eq!(retry_delay(&cfg, 1, None), Duration::from_secs(2));
        assert_eq!(retry_delay(&cfg, 2, None), Duration::from_secs(4));
        // Capped by max_delay.
        assert_eq!(retry_delay(&cfg, 10, None), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_in_band() {
        let cfg = RetryConfig::default();
        for attempt in 0..4 {
            let d = retry_delay(&cfg, attempt, None).as_secs_f64();
            let base = (1u64 << attempt) as f64;
            assert!(d >= base * 0.8 - f64::EPSILON, "attempt {attempt}: {d}");
            assert!(d <= base * 1.2 + f64::EPSILON, "attempt {attempt}: {d}");
        }
    }

    #[test]
    fn retry_after_hint_wins() {
        let cfg = RetryConfig::default();
        assert_eq!(
            retry_delay(&cfg, 0, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn parses_retry_after_seconds() {
        assert_eq!(parse_retry_after("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 12 "), Some(Duration::from_secs(12)));
    }

    #[test]
    fn parses_retry_after_http_date() {
        let when = chrono::Utc::now() + chrono::Duration::seconds(30);
        let header = when.to_rfc2822();
        let parsed = parse_retry_after(&header).unwrap();
        assert!(parsed <= Duration::from_secs(30));
        assert!(parsed >= Duration::from_secs(25));
    }

    #[test]
    fn rejects_garbage_retry_after() {
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("soon"), None);
    }
}
