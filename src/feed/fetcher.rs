use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Feeds larger than this are refused rather than buffered
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default bound on one whole fetch (connect, headers and body)
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while fetching a feed over HTTP.
///
/// Any of these ends the current ingestion cycle for that feed only.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The fetch did not finish within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// HTTP client for feed documents.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedClient {
    /// Build a client with the `gator/<version>` user agent.
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let user_agent = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::with_client(client, timeout))
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Fetch the raw bytes of a feed document.
    ///
    /// The whole exchange, body included, must finish within the client's
    /// timeout. Non-2xx responses are errors; nothing is retried here.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        tokio::time::timeout(self.timeout, self.fetch_unbounded(url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }

    async fn fetch_unbounded(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header(
                reqwest::header::ACCEPT,
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_FEED_SIZE).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: refuse on the declared length before reading anything
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
