//! JSON fetch primitive shared by every upstream client
//!
//! Wraps a `reqwest::Client` with a hard per-request timeout and cooperative
//! cancellation through a `CancellationToken`.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Upper bound on how long a single request may take
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(12);

/// Errors that can occur when fetching JSON
#[derive(Debug, Error)]
pub enum FetchError {
    /// Upstream answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request exceeded the timeout bound
    #[error("Request timed out")]
    Timeout,

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// Response body was not the expected JSON
    #[error("Failed to parse JSON response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Request(error)
        }
    }
}

impl FetchError {
    /// Whether the failure was an intentional cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    /// HTTP status code, when upstream returned one
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// HTTP client that fetches and decodes JSON documents
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Create a fetcher whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("weatherdash/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Create a fetcher around an existing HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GET `url` with `query` parameters and decode the body as `T`
    ///
    /// Resolves to `FetchError::Cancelled` as soon as `cancel` fires, dropping the
    /// in-flight request.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        cancel: Option<&CancellationToken>,
    ) -> Result<T, FetchError> {
        let Some(token) = cancel else {
            return self.send(url, query).await;
        };

        if token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(url, "request cancelled");
                Err(FetchError::Cancelled)
            }
            result = self.send(url, query) => result,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self.client.get(url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown status").to_string(),
            });
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}
