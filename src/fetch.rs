use crate::detect::normalize_media_type;
use crate::error::{AttemptError, FetchError};
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_BACKOFF_FACTOR: u32 = 10;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub verify_tls: bool,
    pub max_attempts: u32,
    pub backoff_unit: Duration,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub bytes: Vec<u8>,
    /// Normalized `Content-Type` of the GET response, empty when absent.
    pub content_type_hint: String,
}

/// Exponential backoff capped at ten units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
        }
    }

    /// Delay after the 1-based `attempt` failed: `unit * min(2^attempt, 10)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32
            .checked_pow(attempt)
            .unwrap_or(u32::MAX)
            .min(MAX_BACKOFF_FACTOR);
        self.unit.saturating_mul(factor)
    }
}

/// Call `attempt` until it succeeds or the policy runs out of attempts.
///
/// `sleep` is called between attempts only, never after the last one.
pub fn retry_with_backoff<T>(
    url: &str,
    policy: &RetryPolicy,
    mut sleep: impl FnMut(Duration),
    mut attempt: impl FnMut(u32) -> Result<T, AttemptError>,
) -> Result<T, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n) {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(%url, attempt = n, max_attempts, error = %err, "download attempt failed");
                if n >= max_attempts {
                    return Err(FetchError::DownloadExhausted {
                        url: url.to_string(),
                        attempts: n,
                        cause: err,
                    });
                }
                let delay = policy.delay_after(n);
                debug!(%url, attempt = n, ?delay, "backing off");
                sleep(delay);
                n += 1;
            }
        }
    }
}

pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(!settings.verify_tls);

        if let Some(user_agent) = &settings.user_agent {
            let mut headers = reqwest::header::HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(user_agent) {
                headers.insert(USER_AGENT, value);
            } else {
                warn!(%user_agent, "ignoring invalid user agent");
            }
            builder = builder.default_headers(headers);
        }

        if !settings.verify_tls {
            warn!("tls certificate verification is disabled");
        }

        Ok(Self {
            client: builder.build().map_err(FetchError::Client)?,
            policy: RetryPolicy::new(settings.max_attempts, settings.backoff_unit),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url`, retrying transport errors and non-2xx statuses.
    pub fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        if url.trim().is_empty() {
            return Err(FetchError::EmptyUrl);
        }

        let result = retry_with_backoff(url, &self.policy, std::thread::sleep, |_| {
            let resp = self.client.get(url).send()?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AttemptError::Status(status));
            }
            let content_type_hint = content_type_of(&resp);
            let bytes = resp.bytes()?.to_vec();
            Ok(FetchResult {
                bytes,
                content_type_hint,
            })
        })?;

        info!(
            %url,
            bytes = result.bytes.len(),
            content_type = %result.content_type_hint,
            "download complete"
        );
        Ok(result)
    }

    /// HEAD `url` and return its normalized media type, or `""` on any failure.
    pub fn probe_content_type(&self, url: &str) -> String {
        match self.client.head(url).send() {
            Ok(resp) if resp.status().is_success() => content_type_of(&resp),
            Ok(resp) => {
                debug!(%url, status = %resp.status(), "content type probe rejected");
                String::new()
            }
            Err(err) => {
                debug!(%url, error = %err, "content type probe failed");
                String::new()
            }
        }
    }
}

fn content_type_of(resp: &Response) -> String {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(normalize_media_type)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn failing(_: u32) -> Result<(), AttemptError> {
        Err(AttemptError::Status(StatusCode::SERVICE_UNAVAILABLE))
    }

    #[test]
    fn backoff_doubles_and_caps_at_ten_units() {
        let policy = RetryPolicy::new(6, Duration::from_secs(1));
        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 10, 10]);
        assert_eq!(policy.delay_after(40), Duration::from_secs(10));
    }

    #[test]
    fn exhausts_after_exactly_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let mut attempts = Vec::new();
        let mut sleeps = Vec::new();

        let err = retry_with_backoff(
            "https://example.org/tx.csv",
            &policy,
            |d| sleeps.push(d),
            |n| {
                attempts.push(n);
                failing(n)
            },
        )
        .unwrap_err();

        assert_eq!(attempts, vec![1, 2, 3]);
        assert_eq!(
            sleeps,
            vec![Duration::from_millis(2), Duration::from_millis(4)]
        );
        match err {
            FetchError::DownloadExhausted {
                url,
                attempts,
                cause: AttemptError::Status(status),
            } => {
                assert_eq!(url, "https://example.org/tx.csv");
                assert_eq!(attempts, 3);
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn stops_retrying_on_first_success() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        let mut sleeps = Vec::new();
        let value = retry_with_backoff(
            "u",
            &policy,
            |d| sleeps.push(d),
            |n| if n < 3 { Err(failing(n).unwrap_err()) } else { Ok(n) },
        )
        .unwrap();
        assert_eq!(value, 3);
        assert_eq!(sleeps, vec![Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let mut calls = 0;
        let _ = retry_with_backoff("u", &policy, |_| {}, |n| {
            calls += 1;
            failing(n)
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn empty_url_is_rejected_before_any_request() {
        let fetcher = Fetcher::new(&FetchSettings {
            timeout: Duration::from_secs(1),
            verify_tls: true,
            max_attempts: 1,
            backoff_unit: Duration::ZERO,
            user_agent: None,
        })
        .unwrap();
        assert!(matches!(fetcher.fetch("  "), Err(FetchError::EmptyUrl)));
    }
}
