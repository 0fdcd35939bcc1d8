use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::UpstreamError;

const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Timeout and retry budget shared by every upstream client.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn client(&self) -> Client {
        Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(2)
            .build()
            .unwrap_or_else(|_| Client::new())
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error or
    /// the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let mut tries = 0;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if tries < self.max_retries && e.is_retryable() => {
                    let delay = backoff_delay(tries);
                    tracing::warn!(
                        service = e.service(),
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

pub fn backoff_delay(attempt: u32) -> Duration {
    let delay_ms = RETRY_BASE_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay_ms.min(RETRY_MAX_DELAY_MS))
}

/// Turn a non-2xx response into [`UpstreamError::Status`], keeping a short
/// prefix of the body for the logs.
pub async fn check_status(service: &'static str, response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        service,
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}

/// Request URLs can carry credentials, so they are dropped before the error
/// reaches a log line or a response body.
pub fn transport(service: &'static str) -> impl Fn(reqwest::Error) -> UpstreamError {
    move |source| UpstreamError::Http {
        service,
        source: source.without_url(),
    }
}

pub fn decode(service: &'static str) -> impl Fn(reqwest::Error) -> UpstreamError {
    move |source| UpstreamError::Payload {
        service,
        message: source.without_url().to_string(),
    }
}
