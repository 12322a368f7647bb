use crate::config::{ExponentialBackoff, RetryConfig, RetryTrigger};
use crate::error::HttpError;
use crate::response::{ResponseBody, parse_retry_after};
use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body_util::{BodyExt, Full};
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

/// Header carrying the retry attempt number (1-indexed) on retried requests.
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Tower layer that retries failed requests with exponential backoff
#[derive(Clone)]
pub struct RetryLayer {
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_timeout: None,
        }
    }

    /// Retry layer bounded by a deadline spanning every attempt and backoff
    #[must_use]
    pub fn with_total_timeout(config: RetryConfig, total_timeout: Option<Duration>) -> Self {
        Self {
            config,
            total_timeout,
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: self.config.clone(),
            total_timeout: self.total_timeout,
        }
    }
}

/// Service that retries on transport errors and configured status codes
///
/// Retries on both `Err(HttpError)` and `Ok(Response)`. A retried response has
/// its body drained up to the configured limit so the connection can be reused.
/// Once retries are exhausted the last response is returned as `Ok`, whatever
/// its status; `Err` is returned only for transport and timeout failures.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    config: RetryConfig,
    total_timeout: Option<Duration>,
}

/// Deadline across all attempts, paired with the configured duration for errors
#[derive(Clone, Copy)]
struct Deadline {
    at: Instant,
    total: Duration,
}

impl Deadline {
    fn check(self) -> Result<(), HttpError> {
        if Instant::now() >= self.at {
            return Err(HttpError::DeadlineExceeded(self.total));
        }
        Ok(())
    }

    /// Shorten `backoff` so the sleep never outlives the deadline
    fn clamp(self, backoff: Duration) -> Result<Duration, HttpError> {
        let remaining = self.at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HttpError::DeadlineExceeded(self.total));
        }
        Ok(backoff.min(remaining))
    }
}

fn clamp_to_deadline(deadline: Option<Deadline>, backoff: Duration) -> Result<Duration, HttpError> {
    match deadline {
        Some(deadline) => deadline.clamp(backoff),
        None => Ok(backoff),
    }
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Consume the instance that was poll_ready'd, keep a fresh clone
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = self.config.clone();
        let deadline = self.total_timeout.map(|total| Deadline {
            at: Instant::now() + total,
            total,
        });

        let (parts, body) = req.into_parts();
        let version = parts.version;
        let extensions = parts.extensions.clone();
        let parts = Arc::new(parts);

        Box::pin(async move {
            let method = parts.method.clone();
            let path = parts.uri.path().to_owned();

            let mut attempt = 0usize;
            loop {
                if let Some(deadline) = deadline {
                    deadline.check()?;
                }

                let mut req = Request::from_parts((*parts).clone(), body.clone());
                *req.version_mut() = version;
                *req.extensions_mut() = extensions.clone();
                if attempt > 0
                    && let Ok(value) = HeaderValue::try_from(attempt.to_string())
                {
                    req.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
                }

                let mut svc = inner.clone();
                svc.ready().await?;

                match svc.call(req).await {
                    Ok(resp) => {
                        let status = resp.status().as_u16();
                        let trigger = RetryTrigger::Status(status);
                        if attempt >= config.max_retries || !config.should_retry(trigger, &method)
                        {
                            return Ok(resp);
                        }

                        let retry_after = if config.ignore_retry_after {
                            None
                        } else {
                            parse_retry_after(resp.headers())
                        };
                        let backoff = retry_after
                            .unwrap_or_else(|| calculate_backoff(&config.backoff, attempt));

                        if let Err(e) =
                            drain_response_body(resp, config.retry_response_drain_limit).await
                        {
                            tracing::debug!(error = %e, "failed to drain response before retry");
                        }

                        let backoff = clamp_to_deadline(deadline, backoff)?;
                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            status,
                            method = %method,
                            path = %path,
                            backoff_ms = backoff.as_millis(),
                            retry_after_used = retry_after.is_some(),
                            "retrying request after status code"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    Err(err) => {
                        let trigger = get_retry_trigger(&err);
                        if attempt >= config.max_retries || !config.should_retry(trigger, &method)
                        {
                            return Err(err);
                        }

                        let backoff = clamp_to_deadline(
                            deadline,
                            calculate_backoff(&config.backoff, attempt),
                        )?;
                        tracing::debug!(
                            retry = attempt + 1,
                            max_retries = config.max_retries,
                            error = %err,
                            method = %method,
                            path = %path,
                            backoff_ms = backoff.as_millis(),
                            "retrying request after error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
                attempt += 1;
            }
        })
    }
}

/// Read and discard up to `limit` bytes of a response body.
///
/// HTTP/1.1 connections go back to the pool only once the body has been
/// consumed; past the limit the connection is dropped instead. The limit
/// applies to decompressed bytes.
async fn drain_response_body(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<(), HttpError> {
    if let Some(len) = response
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        && len > limit as u64
    {
        return Ok(());
    }

    let mut body = std::pin::pin!(response.into_body());
    let mut drained = 0usize;
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            drained += chunk.len();
            if drained >= limit {
                break;
            }
        }
    }
    Ok(())
}

fn get_retry_trigger(err: &HttpError) -> RetryTrigger {
    match err {
        HttpError::Transport(_) => RetryTrigger::TransportError,
        HttpError::Timeout(_) => RetryTrigger::Timeout,
        _ => RetryTrigger::NonRetryable,
    }
}

/// Backoff before retry number `attempt + 1`.
///
/// Non-finite or negative inputs are sanitized instead of panicking in
/// `Duration::from_secs_f64`. The result never exceeds `backoff.max` (capped at
/// one day), jitter included.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, attempt: usize) -> Duration {
    const MAX_BACKOFF_SECS: f64 = 86_400.0;

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let multiplier = if backoff.multiplier.is_finite() && backoff.multiplier >= 0.0 {
        backoff.multiplier
    } else {
        1.0
    };
    let initial = backoff.initial.as_secs_f64();
    let max = backoff.max.as_secs_f64().min(MAX_BACKOFF_SECS);

    let raw = initial * multiplier.powi(exponent);
    let secs = if raw.is_finite() {
        raw.clamp(0.0, max)
    } else {
        max
    };
    let duration = Duration::from_secs_f64(secs);

    let duration = if backoff.jitter {
        let factor = rand::rng().random_range(0.0..=0.25);
        duration + duration.mul_f64(factor)
    } else {
        duration
    };
    duration.min(Duration::from_secs_f64(max))
}
