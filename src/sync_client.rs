//! Delivery of a scraped batch to the remote sync endpoint.
//!
//! One `deliver` call is one sync invocation: it either reports how many rows
//! the endpoint appended or fails once the retry budget is spent.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::market_records::{SyncResponse, SyncTransaction};

const USER_AGENT: &str = concat!("market-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("nothing to deliver: batch is empty")]
    EmptyBatch,

    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected endpoint response: {0}")]
    Response(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Network(_) | DeliveryError::Timeout(_) => true,
            DeliveryError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1_u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl SyncClient {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, DeliveryError> {
        let endpoint = endpoint.into().trim().to_string();
        if endpoint.is_empty() {
            return Err(DeliveryError::Config("webhook url is empty".to_string()));
        }
        if retry.max_attempts == 0 {
            return Err(DeliveryError::Config("max_attempts must be at least 1".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DeliveryError::Config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            timeout,
            retry,
        })
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    async fn attempt(&self, batch: &[SyncTransaction]) -> Result<SyncResponse, DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(Self::build_headers())
            .json(batch)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(self.timeout)
                } else {
                    DeliveryError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| DeliveryError::Network(e.to_string()))?;
        let parsed: SyncResponse = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::Response(format!("{e}: {body}")))?;
        if !parsed.is_success() {
            return Err(DeliveryError::Response(format!("result was {:?}", parsed.result)));
        }
        Ok(parsed)
    }

    /// Posts the batch (newest first), retrying transient failures with backoff.
    pub async fn deliver(&self, batch: &[SyncTransaction]) -> Result<SyncResponse, DeliveryError> {
        if batch.is_empty() {
            return Err(DeliveryError::EmptyBatch);
        }
        let mut attempt = 1;
        loop {
            match self.attempt(batch).await {
                Ok(resp) => {
                    info!(endpoint = %self.endpoint, attempt, sent = batch.len(), added = resp.added, "sync delivered");
                    return Ok(resp);
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(attempt, ?delay, "sync delivery failed, retrying: {err}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt, "sync delivery failed: {err}");
                    return Err(err);
                }
            }
        }
    }
}
