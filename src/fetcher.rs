// src/fetcher.rs
//! One logical fetch: global in-flight slot → rate permit → bounded-timeout
//! GET → classify → backoff loop. The HTTP call sits behind a `Transport`
//! trait so tests can drive the retry machinery with scripted responses
//! instead of a live network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::FetchError;
use crate::limiter::PaceLimiter;
use crate::retry::{FetchAttempt, RetryDecision, RetryPolicy};

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError>;
}

/// Production transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError> {
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        Ok(TransportResponse {
            status,
            body,
            retry_after,
        })
    }
}

/// Performs logical fetches for all sources. The per-source budget is the
/// serialization point: concurrent fetches to different sources proceed
/// independently, while the semaphore caps total in-flight requests.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    limiter: Arc<PaceLimiter>,
    retry: RetryPolicy,
    in_flight: Arc<Semaphore>,
}

impl Fetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<PaceLimiter>,
        retry: RetryPolicy,
        max_in_flight: usize,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry,
            in_flight: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch `url` on behalf of `source`, retrying transient failures per the
    /// policy. Issues at most `max_attempts` requests.
    pub async fn fetch(&self, source: &str, url: &str) -> Result<String, FetchError> {
        let mut attempt_no = 0u32;
        loop {
            attempt_no += 1;

            // Global slot first: a token consumed before a long semaphore wait
            // would let queued requests to the same source fire back-to-back.
            let (result, latency) = {
                let _permit = self
                    .in_flight
                    .acquire()
                    .await
                    .expect("in-flight semaphore never closed");
                self.limiter.acquire(source).await;
                let t0 = Instant::now();
                let result = self.transport.get(url).await;
                (result, t0.elapsed())
            };
            histogram!("fetch_latency_ms").record(latency.as_secs_f64() * 1_000.0);

            let (err, retry_after) = match result {
                Ok(resp) if resp.status < 400 => {
                    self.limiter.record(source, true);
                    counter!("fetch_ok_total").increment(1);
                    return Ok(resp.body);
                }
                Ok(resp) => (FetchError::Status(resp.status), resp.retry_after),
                Err(e) => (e, None),
            };

            self.limiter.record(source, false);
            counter!("fetch_errors_total", "kind" => err.kind()).increment(1);

            let attempt = FetchAttempt {
                url: url.to_string(),
                attempt: attempt_no,
                outcome: Err(err.clone()),
                latency,
                retry_after,
            };
            match self.retry.decide(&attempt) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::debug!(
                        source,
                        url,
                        attempt = attempt_no,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient fetch failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(
                        source,
                        url,
                        attempts = attempt_no,
                        error = %err,
                        "fetch gave up"
                    );
                    return Err(err);
                }
            }
        }
    }
}
