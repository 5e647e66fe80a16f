//! Retry policy for upstream metadata probes
//!
//! A [`RetryPolicy`] decides which outcomes are transient and how long to
//! wait between attempts; [`call_with_retry`] drives any async operation with
//! it, so the HEAD probe and the range GET fallback share one loop.

use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Upstream statuses worth another attempt
pub const RETRY_STATUSES: [u16; 6] = [429, 500, 502, 503, 504, 509];

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Outcome of classifying one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient failure; the upstream may have asked for a specific delay
    Retry(Option<Duration>),
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each one after
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up after the first attempt
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn is_retryable_status(status: StatusCode) -> bool {
        RETRY_STATUSES.contains(&status.as_u16())
    }

    pub fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
    }

    /// Classify the result of sending one upstream request
    pub fn classify(&self, outcome: &Result<Response, reqwest::Error>) -> RetryDecision {
        match outcome {
            Ok(response) if Self::is_retryable_status(response.status()) => {
                let hint = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                RetryDecision::Retry(hint)
            }
            Ok(_) => RetryDecision::Stop,
            Err(err) if Self::is_retryable_error(err) => RetryDecision::Retry(None),
            Err(_) => RetryDecision::Stop,
        }
    }

    /// Delay before retry number `attempt` (zero based)
    pub fn delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => hint.min(self.max_delay),
            None => self
                .min_delay
                .saturating_mul(1u32 << attempt.min(16))
                .min(self.max_delay),
        }
    }
}

/// Parse a `Retry-After` value given in seconds. HTTP-date values are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Run `op` until `classify` stops asking for retries or the policy is
/// exhausted, returning the last outcome either way.
pub async fn call_with_retry<T, E, Op, Fut, Classify>(
    policy: &RetryPolicy,
    mut op: Op,
    classify: Classify,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: Fn(&Result<T, E>) -> RetryDecision,
{
    let mut attempt = 0;
    loop {
        let outcome = op().await;
        match classify(&outcome) {
            RetryDecision::Retry(hint) if attempt < policy.max_retries => {
                let delay = policy.delay(attempt, hint);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient upstream failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            _ => return outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn classify_status(outcome: &Result<u16, String>) -> RetryDecision {
        match outcome {
            Ok(status) if RETRY_STATUSES.contains(status) => RetryDecision::Retry(None),
            _ => RetryDecision::Stop,
        }
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [429, 500, 502, 503, 504, 509] {
            assert!(RetryPolicy::is_retryable_status(
                StatusCode::from_u16(code).unwrap()
            ));
        }
        for code in [200, 206, 400, 403, 404, 416, 501] {
            assert!(!RetryPolicy::is_retryable_status(
                StatusCode::from_u16(code).unwrap()
            ));
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay(1, None), Duration::from_millis(200));
        assert_eq!(policy.delay(3, None), Duration::from_millis(800));
        assert_eq!(policy.delay(4, None), Duration::from_secs(1));
        assert_eq!(policy.delay(40, None), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay(0, Some(Duration::from_secs(1))),
            Duration::from_secs(1)
        );
        assert_eq!(policy.delay(0, Some(Duration::from_secs(120))), policy.max_delay);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2020 07:28:00 GMT"), None);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut calls = 0u32;
        let result = call_with_retry(
            &fast_policy(5),
            || {
                calls += 1;
                let n = calls;
                async move { Ok::<u16, String>(if n < 3 { 503 } else { 200 }) }
            },
            classify_status,
        )
        .await;

        assert_eq!(result, Ok(200));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mut calls = 0u32;
        let result = call_with_retry(
            &fast_policy(2),
            || {
                calls += 1;
                async { Ok::<u16, String>(503) }
            },
            classify_status,
        )
        .await;

        assert_eq!(result, Ok(503));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let mut calls = 0u32;
        let result = call_with_retry(
            &fast_policy(5),
            || {
                calls += 1;
                async { Err::<u16, String>("refused".to_string()) }
            },
            classify_status,
        )
        .await;

        assert_eq!(result, Err("refused".to_string()));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let mut calls = 0u32;
        let result = call_with_retry(
            &RetryPolicy::none(),
            || {
                calls += 1;
                async { Ok::<u16, String>(429) }
            },
            classify_status,
        )
        .await;

        assert_eq!(result, Ok(429));
        assert_eq!(calls, 1);
    }
}
