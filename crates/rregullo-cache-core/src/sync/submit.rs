//! Delivery of queued reports to the reporting endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use super::PendingReport;

/// Maximum number of retries for rate-limited (429) submissions.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Rejected by server ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Unauthorized - session may be expired")]
    Unauthorized,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl SubmitError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body = Self::truncate_body(body);
        match status.as_u16() {
            401 => SubmitError::Unauthorized,
            429 => SubmitError::RateLimited,
            // Request Timeout is transient like a 5xx
            code @ (408 | 500..=599) => SubmitError::ServerError { status: code, body },
            code => SubmitError::Rejected { status: code, body },
        }
    }

    /// Whether the report should stay queued for another attempt.
    ///
    /// A 401 is retryable: the report is fine, the session is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SubmitError::Rejected { .. })
    }
}

/// Server acknowledgement of a delivered report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmitReceipt {
    /// Server-side id, when the endpoint returns one.
    #[serde(default)]
    pub id: Option<String>,
}

/// Delivers one report to the server.
#[async_trait]
pub trait ReportSubmitter: Send + Sync {
    async fn submit(&self, report: &PendingReport) -> Result<SubmitReceipt, SubmitError>;
}

/// Submitter that posts reports as JSON to the reporting endpoint.
#[derive(Clone)]
pub struct HttpReportSubmitter {
    client: Client,
    endpoint: Url,
    initial_backoff: Duration,
}

impl HttpReportSubmitter {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the first rate-limit backoff delay; it doubles on each retry.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ReportSubmitter for HttpReportSubmitter {
    async fn submit(&self, report: &PendingReport) -> Result<SubmitReceipt, SubmitError> {
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let response = self
                .client
                .post(self.endpoint.clone())
                .header(header::ACCEPT, "application/json")
                .json(&report.submission())
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body = response.text().await?;
                // Endpoints that answer with an empty body or non-JSON still count as delivered
                let receipt = serde_json::from_str(&body).unwrap_or_default();
                debug!(report = %report.id, status = status.as_u16(), "Report delivered");
                return Ok(receipt);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(SubmitError::RateLimited);
                }
                warn!(
                    report = %report.id,
                    retry = retries,
                    backoff_ms = backoff.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::from_status(status, &body));
        }
    }
}
