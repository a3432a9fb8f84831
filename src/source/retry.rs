use std::time::Duration;

use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::model::FetchError;

const BASE_BACKOFF_MS: u64 = 250;
const MAX_JITTER_MS: u64 = 250;

/// Shared HTTP client that retries transient failures (transport errors,
/// 5xx, 429) with exponential backoff plus jitter.
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    max_retries: u32,
}

impl RetryingClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("finseries/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Http(e.without_url()))?;

        Ok(Self { client, max_retries })
    }

    /// GETs `url` and decodes the JSON body. Query parameters are kept out of
    /// error messages since they carry API keys.
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
        let mut attempt = 0;
        loop {
            debug!("GET {} (attempt {})", url, attempt + 1);
            match self.client.get(url).query(query).send().await {
                Ok(response) if response.status().is_success() => {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| FetchError::Decode(e.without_url().to_string()));
                }
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable(status) || attempt >= self.max_retries {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                    warn!("GET {} returned {}, retrying", url, status);
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect() || e.is_request();
                    if !transient || attempt >= self.max_retries {
                        return Err(FetchError::Http(e.without_url()));
                    }
                    warn!("GET {} failed: {}, retrying", url, e.without_url());
                }
            }
            attempt += 1;
            sleep(backoff(attempt)).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn backoff(attempt: u32) -> Duration {
    let exp = BASE_BACKOFF_MS.saturating_mul(1 << attempt.saturating_sub(1).min(6));
    let jitter = rand::rng().random_range(0..MAX_JITTER_MS);
    Duration::from_millis(exp + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_server_errors_and_rate_limits_retry() {
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let first = backoff(1);
        assert!(first >= Duration::from_millis(250) && first < Duration::from_millis(500));
        let third = backoff(3);
        assert!(third >= Duration::from_millis(1000) && third < Duration::from_millis(1250));
        let capped = backoff(40);
        assert!(capped < Duration::from_millis(250 * 64 + 250));
    }
}
