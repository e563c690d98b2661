//! Cardwise CLI: the main entry point.
//!
//! Commands:
//! - `init`     Write a default config file
//! - `config`   Show, locate, or validate configuration
//! - `import`   Load a JSON card file into a business catalog
//! - `classify` Show intent and tiered loading for a message
//! - `chat`     Single-message or interactive conversation
//! - `state`    Inspect a conversation's working state

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "cardwise",
    about = "Cardwise — knowledge-card context engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file to ~/.cardwise/config.toml
    Init,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Import knowledge cards from a JSON file
    Import {
        /// Path to a JSON array of cards, or an object with a `cards` array
        file: std::path::PathBuf,

        /// Business the cards belong to
        #[arg(short, long)]
        business: String,
    },

    /// Classify a message and show which cards would load
    Classify {
        message: String,

        #[arg(short, long)]
        business: String,

        /// Skip the model classifier and use keyword matching only
        #[arg(long)]
        keywords_only: bool,
    },

    /// Chat against a business's knowledge cards
    Chat {
        #[arg(short, long)]
        business: String,

        /// Continue (or create) a conversation with this id
        #[arg(short, long)]
        conversation: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Treat the business as having no knowledge base
        #[arg(long)]
        no_knowledge_base: bool,
    },

    /// Show a conversation's working state and recent messages
    State {
        conversation: String,

        /// Number of recent messages to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (secrets redacted)
    Show,
    /// Print the config file path
    Path,
    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
        Commands::Import { file, business } => commands::import::run(&file, &business).await?,
        Commands::Classify {
            message,
            business,
            keywords_only,
        } => commands::classify::run(&message, &business, keywords_only).await?,
        Commands::Chat {
            business,
            conversation,
            message,
            no_knowledge_base,
        } => {
            commands::chat::run(commands::chat::ChatArgs {
                business,
                conversation,
                message,
                has_knowledge_base: !no_knowledge_base,
            })
            .await?
        }
        Commands::State {
            conversation,
            limit,
        } => commands::state::run(&conversation, limit).await?,
    }

    Ok(())
}
