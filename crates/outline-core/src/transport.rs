//! Completion transports
//!
//! A transport turns a [`ChatRequest`] into a stream of raw byte chunks
//! carrying server-sent events. Chunk boundaries are arbitrary; decoding
//! happens downstream.

use crate::config::{exponential_backoff, OutlineConfig};
use crate::error::TransportError;
use crate::request::ChatRequest;
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw byte chunks of one response body
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Longest error body kept in [`TransportError::Status`]
const MAX_ERROR_BODY: usize = 2048;

/// Opens completion streams
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Send `request` and return its response body as it arrives
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}

/// HTTP transport with bearer auth and retry
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    retries: u32,
    backoff: Duration,
}

impl HttpTransport {
    /// Create transport for `endpoint`, single attempt
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            retries: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Create transport from config, reading the key from the environment
    ///
    /// # Errors
    /// Returns [`TransportError::MissingCredentials`] if the variable named
    /// by `api_key_env` is unset or blank.
    pub fn from_config(config: &OutlineConfig) -> Result<Self, TransportError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| TransportError::MissingCredentials(config.api_key_env.clone()))?;
        Ok(Self::new(&config.endpoint, api_key).with_retries(config.retries, config.backoff(0)))
    }

    /// Set attempts (including the first) and base backoff
    #[must_use]
    pub fn with_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.retries = retries.max(1);
        self.backoff = backoff;
        self
    }

    /// Set a preconfigured client
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(response) => {
                    tracing::debug!(endpoint = %self.endpoint, attempt, "completion stream opened");
                    return Ok(response
                        .bytes_stream()
                        .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(TransportError::from))
                        .boxed());
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.retries => {
                    let delay = exponential_backoff(self.backoff, attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        retries = self.retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "completion request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, attempts = attempt + 1, "completion request failed");
                    return Err(e);
                }
            }
        }
    }
}

/// Serves a recorded response body from disk
///
/// Every request gets the same recording, cut into fixed-size chunks.
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    path: PathBuf,
    chunk_size: usize,
}

impl ReplayTransport {
    /// Default chunk size in bytes
    pub const DEFAULT_CHUNK_SIZE: usize = 64;

    /// Create transport replaying `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set chunk size (at least one byte)
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Recording being replayed
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CompletionTransport for ReplayTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let body = tokio::fs::read(&self.path).await?;
        tracing::debug!(
            path = %self.path.display(),
            bytes = body.len(),
            model = %request.model,
            "replaying recorded stream"
        );
        let chunks: Vec<Result<Vec<u8>, TransportError>> = body
            .chunks(self.chunk_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}
