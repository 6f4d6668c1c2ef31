// Folio research assistant
// Main entry point for the folio binary

use clap::Parser;
use folio_engine::cli::{Cli, Command};
use folio_engine::config::Config;
use folio_engine::handlers::{handle_chat, handle_config, handle_replay, ChatRequest, OutputFormat};
use folio_engine::telemetry::{effective_level, init_telemetry_with_level};
use sdk::errors::{ErrorExt, RuntimeError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // RUST_LOG still wins over both
    init_telemetry_with_level(effective_level(cli.log.as_deref(), &config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::debug!("Folio v{} ({} - {})", version, commit, timestamp);

    // Handle commands
    let result = match cli.command {
        Command::Chat {
            text,
            title,
            deep_research,
            direction,
            offline,
        } => {
            let request = ChatRequest {
                text: text.join(" "),
                title,
                deep_research,
                direction,
                offline,
            };
            tracing::info!(offline = request.offline, "Starting chat");
            handle_chat(request, &config, format).await
        }

        Command::Replay { file } => {
            tracing::info!("Replaying event log: {}", file.display());
            handle_replay(file, format).await
        }

        Command::Config { action } => {
            tracing::debug!("Config management: {:?}", action);
            handle_config(action, &config, cli.config.as_deref(), format).await
        }
    };

    if let Err(e) = &result {
        if let Some(runtime_error) = e.downcast_ref::<RuntimeError>() {
            eprintln!("Hint: {}", runtime_error.user_hint());
        }
    }
    result
}
