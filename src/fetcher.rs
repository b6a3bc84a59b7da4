//! Single-URL HTTP fetch with bounded retry and encoding repair.
//!
//! The fetcher knows nothing about crawling. It issues one GET through an
//! injected [`RequestClient`], retries transient failures with exponential
//! backoff, and hands back `(url, body)`. A failed fetch is an empty body,
//! never an error: only requests that cannot be built at all propagate.
//!
//! # Retry Strategy
//!
//! - 404 and 403 are terminal: returned at once with an empty body
//! - timeouts, connection errors, other non-2xx statuses and empty 2xx
//!   bodies are retried up to `max_retry` attempts in total
//! - delay between attempts: `min(base_delay * 2^(attempt-1), max_delay)`
//!   plus 0-250ms of random jitter; a zero `base_delay` disables sleeping

use crate::encoding::EncodingRepair;
use crate::error::{EngineError, Result};
use rand::{Rng, rng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// Status and raw body of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Why a [`RequestClient`] could not produce a response.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl RequestError {
    /// Everything except a malformed request is worth another attempt.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RequestError::Invalid(_))
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RequestError::Timeout
        } else if e.is_builder() {
            RequestError::Invalid(e.to_string())
        } else if e.is_connect() {
            RequestError::Connect(e.to_string())
        } else {
            RequestError::Transport(e.to_string())
        }
    }
}

/// The HTTP client handle the engine fetches through.
///
/// One client is built per crawl or service lifetime and shared by reference
/// across every fetch; connection pooling is the implementation's business.
pub trait RequestClient {
    async fn get(&self, url: &str, params: &[(String, String)]) -> std::result::Result<ClientResponse, RequestError>;
}

impl<T: RequestClient + ?Sized> RequestClient for &T {
    async fn get(&self, url: &str, params: &[(String, String)]) -> std::result::Result<ClientResponse, RequestError> {
        (**self).get(url, params).await
    }
}

impl<T: RequestClient + ?Sized> RequestClient for Arc<T> {
    async fn get(&self, url: &str, params: &[(String, String)]) -> std::result::Result<ClientResponse, RequestError> {
        (**self).get(url, params).await
    }
}

impl RequestClient for reqwest::Client {
    async fn get(&self, url: &str, params: &[(String, String)]) -> std::result::Result<ClientResponse, RequestError> {
        let response = reqwest::Client::get(self, url).query(params).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(ClientResponse { status, body })
    }
}

/// Coarse meaning of an HTTP status code, used for retry decisions and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Redirected,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    TooManyRequests,
    ClientError,
    InternalServerError,
    ServerError,
    Unknown,
}

impl RequestStatus {
    pub fn from_status_code(code: u16) -> Self {
        match code {
            200..=299 => RequestStatus::Success,
            300..=399 => RequestStatus::Redirected,
            400 => RequestStatus::BadRequest,
            401 => RequestStatus::Unauthorized,
            403 => RequestStatus::Forbidden,
            404 => RequestStatus::NotFound,
            429 => RequestStatus::TooManyRequests,
            405..=499 => RequestStatus::ClientError,
            500 => RequestStatus::InternalServerError,
            501..=599 => RequestStatus::ServerError,
            _ => RequestStatus::Unknown,
        }
    }

    /// 404 and 403 will not change on retry.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::NotFound | RequestStatus::Forbidden)
    }
}

/// Fetches one page at a time through a shared client.
///
/// Cheap to share: `fetch` takes `&self` and keeps no per-request state, so
/// many fetches can be in flight on one instance.
#[derive(Debug, Clone)]
pub struct Fetcher<C> {
    client: C,
    max_retry: usize,
    base_delay: Duration,
    max_delay: Duration,
    repair: EncodingRepair,
}

impl<C: RequestClient> Fetcher<C> {
    /// Create a fetcher making at most `max_retry` attempts per URL (zero is
    /// treated as one).
    pub fn new(client: C, max_retry: usize) -> Self {
        Self {
            client,
            max_retry: max_retry.max(1),
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            repair: EncodingRepair::default(),
        }
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_encoding_repair(mut self, repair: EncodingRepair) -> Self {
        self.repair = repair;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn max_retry(&self) -> usize {
        self.max_retry
    }

    /// Fetch `url` with query `params`.
    ///
    /// # Returns
    ///
    /// `(url, body)`; the body is empty when the page was not found,
    /// forbidden, or every attempt failed.
    ///
    /// # Errors
    ///
    /// [`EngineError::Request`] when the request itself is malformed (for
    /// example an unparseable URL). Network failures are never errors.
    #[instrument(level = "debug", skip_all, fields(%url))]
    pub async fn fetch(&self, url: &str, params: &[(String, String)]) -> Result<(String, String)> {
        let total_t0 = Instant::now();

        for attempt in 1..=self.max_retry {
            match self.client.get(url, params).await {
                Ok(response) => {
                    let status = RequestStatus::from_status_code(response.status);
                    if status.is_terminal() {
                        warn!(%url, code = response.status, ?status, "Terminal status; not retrying");
                        return Ok((url.to_string(), String::new()));
                    }
                    if status == RequestStatus::Success {
                        let body = self.repair.decode(&response.body);
                        if !body.is_empty() {
                            debug!(
                                %url,
                                attempt,
                                bytes = body.len(),
                                elapsed_ms = total_t0.elapsed().as_millis() as u64,
                                "Fetched page"
                            );
                            return Ok((url.to_string(), body));
                        }
                        warn!(%url, attempt, max = self.max_retry, "Empty body");
                    } else {
                        warn!(%url, attempt, max = self.max_retry, code = response.status, ?status, "Unsuccessful status");
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(%url, attempt, max = self.max_retry, error = %e, "Request failed");
                }
                Err(e) => {
                    error!(%url, error = %e, "Request could not be built");
                    return Err(EngineError::Request {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }

            if attempt < self.max_retry {
                let delay = self.delay_for(attempt);
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }

        error!(
            %url,
            attempts = self.max_retry,
            elapsed_ms = total_t0.elapsed().as_millis() as u64,
            "Fetch exhausted retries"
        );
        Ok((url.to_string(), String::new()))
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}
