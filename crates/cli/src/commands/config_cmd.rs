//! `cardwise config`: Configuration management commands.

use cardwise_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let mut warnings = Vec::new();
            if !config.has_api_key() && !matches!(config.provider.name.as_str(), "ollama" | "vllm" | "local") {
                warnings.push("No API key set (set CARDWISE_API_KEY or OPENAI_API_KEY)");
            }
            if config.compaction.threshold < config.compaction.interval {
                warnings.push("compaction.threshold is below compaction.interval");
            }
            if !config.classifier.enabled {
                warnings.push("Classifier disabled; intents come from keyword matching only");
            }

            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:    {}", config.provider.name);
            println!("   Model:       {}", config.provider.model);
            println!("   Classifier:  {}", config.classifier_model());
            println!("   Summarizer:  {}", config.summarizer_model());
            println!("   Store:       {} ({})", config.store.backend, config.store.resolved_path());
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", redacted_toml(config)?);
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

fn redacted_toml(mut config: AppConfig) -> Result<String, toml::ser::Error> {
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("***".into());
    }
    toml::to_string_pretty(&config)
}
