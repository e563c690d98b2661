//! Provider construction from configuration.
//!
//! Every provider handed to the engine is wrapped in a [`GuardedProvider`]
//! so generation, classification and summarization share one retry policy
//! and, when enabled, one rate limiter.

use crate::openai_compat::OpenAiCompatProvider;
use crate::rate_limit::RateLimiter;
use crate::retry::{GuardedProvider, RetryPolicy};
use cardwise_config::AppConfig;
use cardwise_core::error::ProviderError;
use cardwise_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build the guarded generation provider described by `config`.
///
/// `limiter` is shared by every provider built for the same deployment unit;
/// pass `None` to disable rate limiting.
pub fn build_from_config(
    config: &AppConfig,
    limiter: Option<Arc<RateLimiter>>,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.provider.name.as_str();
    let api_key = match (&config.provider.api_key, requires_api_key(name)) {
        (Some(key), _) => key.clone(),
        (None, false) => String::new(),
        (None, true) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}'; set CARDWISE_API_KEY or provider.api_key"
            )));
        }
    };

    let base_url = if config.provider.api_url == cardwise_config::ProviderConfig::default().api_url {
        default_base_url(name)
    } else {
        config.provider.api_url.clone()
    };

    let inner: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::with_timeout(
        name,
        &base_url,
        api_key,
        Duration::from_secs(config.provider.timeout_secs),
    ));

    info!(provider = name, url = %base_url, model = %config.provider.model, "Provider configured");
    Ok(guard(inner, config, limiter))
}

/// Wrap an existing provider with the configured retry policy and limiter.
pub fn guard(
    inner: Arc<dyn Provider>,
    config: &AppConfig,
    limiter: Option<Arc<RateLimiter>>,
) -> Arc<dyn Provider> {
    let mut guarded = GuardedProvider::new(inner, RetryPolicy::from_config(&config.retry));
    if let Some(limiter) = limiter {
        guarded = guarded.with_rate_limiter(limiter, config.provider.name.clone());
    }
    Arc::new(guarded)
}

fn requires_api_key(provider_name: &str) -> bool {
    !matches!(provider_name, "ollama" | "vllm" | "local")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "vllm" | "local" => "http://localhost:8000/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}
