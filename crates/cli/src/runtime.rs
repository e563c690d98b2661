//! Shared wiring for commands: config, store, provider, turn processor.

use cardwise_config::AppConfig;
use cardwise_core::provider::Provider;
use cardwise_engine::TurnProcessor;
use cardwise_providers::{RateLimiter, build_from_config};
use cardwise_store::StoreBackend;
use std::sync::Arc;
use tracing::warn;

pub struct Runtime {
    pub config: AppConfig,
    pub store: StoreBackend,
}

impl Runtime {
    /// Load config and open the configured store.
    pub async fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
        if config.store.backend == "in_memory" {
            warn!("Using the in-memory store; nothing persists after this command exits");
        }
        let store = StoreBackend::open(&config.store).await?;
        Ok(Self { config, store })
    }

    /// The guarded generation provider, or a setup hint when no key is set.
    pub fn provider(&self) -> Result<Arc<dyn Provider>, Box<dyn std::error::Error>> {
        let limiter = RateLimiter::from_config(&self.config.rate_limit).map(Arc::new);
        match build_from_config(&self.config, limiter) {
            Ok(provider) => Ok(provider),
            Err(e) => {
                eprintln!();
                eprintln!("  ERROR: {e}");
                eprintln!();
                eprintln!("  Set one of these environment variables:");
                eprintln!("    CARDWISE_API_KEY = 'sk-...'   (generic)");
                eprintln!("    OPENAI_API_KEY   = 'sk-...'   (for OpenAI direct)");
                eprintln!();
                eprintln!("  Or add it to your config file:");
                eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
                eprintln!();
                Err(e.into())
            }
        }
    }

    pub fn processor(&self) -> Result<TurnProcessor, Box<dyn std::error::Error>> {
        Ok(TurnProcessor::from_config(
            &self.config,
            self.store.catalog(),
            self.store.conversations(),
            self.provider()?,
        ))
    }
}
