//! Bounded retry with exponential backoff, plus optional rate limiting.
//!
//! [`GuardedProvider`] decorates any [`Provider`] and is applied uniformly to
//! generation, classification and summarization. Non-retryable errors
//! (see [`ProviderError::is_retryable`]) are returned immediately.

use crate::rate_limit::RateLimiter;
use async_trait::async_trait;
use cardwise_core::error::ProviderError;
use cardwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Attempt budget and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &cardwise_config::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_backoff: Duration::from_millis(config.base_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// A provider wrapped with retry and an injected rate limiter.
pub struct GuardedProvider {
    inner: Arc<dyn Provider>,
    policy: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
    scope: String,
    attempt_timeout: Option<Duration>,
}

impl GuardedProvider {
    pub fn new(inner: Arc<dyn Provider>, policy: RetryPolicy) -> Self {
        let scope = inner.name().to_string();
        Self {
            inner,
            policy,
            limiter: None,
            scope,
            attempt_timeout: None,
        }
    }

    /// Share a rate limiter; requests are counted under `scope`.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>, scope: impl Into<String>) -> Self {
        self.limiter = Some(limiter);
        self.scope = scope.into();
        self
    }

    /// Bound each individual attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn attempt(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if let Some(limiter) = &self.limiter
            && !limiter.check(&self.scope)
        {
            let wait = limiter.retry_after(&self.scope);
            return Err(ProviderError::RateLimited {
                retry_after_secs: wait.as_secs().max(1),
            });
        }

        match self.attempt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.inner.complete(request))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}ms",
                        self.inner.name(),
                        limit.as_millis()
                    )))
                }),
            None => self.inner.complete(request).await,
        }
    }
}

#[async_trait]
impl Provider for GuardedProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 1;

        loop {
            match self.attempt(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(provider = %self.inner.name(), attempt, "Provider recovered after retries");
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(provider = %self.inner.name(), error = %e, "Non-retryable provider error");
                    return Err(e);
                }
                Err(e) if attempt >= self.policy.max_attempts => {
                    warn!(
                        provider = %self.inner.name(),
                        attempts = attempt,
                        error = %e,
                        "Provider retries exhausted"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let mut delay = self.policy.backoff(attempt);
                    if let ProviderError::RateLimited { retry_after_secs } = &e {
                        delay = delay
                            .max(Duration::from_secs(*retry_after_secs))
                            .min(self.policy.max_backoff);
                    }
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        self.inner.health_check().await
    }
}
