//! The 429 retry leg of the interceptor contract (§4.1).
//!
//! 401 handling lives in [`crate::client::backend`] since it needs to
//! re-authorize and mutate client state; this module only owns the
//! stateless rate-limit backoff.

use crate::error::Result;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;

const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Result of a retried send. A thin wrapper rather than a bare `Response` so
/// the call site at [`crate::client::backend::BackendClient::execute`] reads
/// as "decide what to do with the response", not "the request itself may
/// still fail".
pub enum RetryOutcome {
    Response(reqwest::Response),
}

/// Send `builder`, retrying up to [`MAX_RATE_LIMIT_RETRIES`] times on HTTP
/// 429, honoring `Retry-After` when present.
pub async fn with_retry(builder: RequestBuilder) -> Result<RetryOutcome> {
    let mut attempt = 0u32;
    let mut current = builder;
    loop {
        let next_clone = current.try_clone();
        let response = current.send().await?;

        if response.status() != StatusCode::TOO_MANY_REQUESTS || attempt >= MAX_RATE_LIMIT_RETRIES {
            return Ok(RetryOutcome::Response(response));
        }

        let delay = retry_after(&response).unwrap_or(DEFAULT_RETRY_AFTER);
        tracing::warn!(attempt, delay_secs = delay.as_secs(), "rate limited, retrying");
        attempt += 1;
        tokio::time::sleep(delay).await;

        current = next_clone.expect("request body must be buffered to support retry");
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_after_is_five_seconds() {
        assert_eq!(DEFAULT_RETRY_AFTER, Duration::from_secs(5));
    }
}
