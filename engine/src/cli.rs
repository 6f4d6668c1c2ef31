//! CLI interface for Folio
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags of the `folio` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Folio literature research assistant
///
/// Drives research sessions against a local model: create a session, ask a
/// question and watch the answer stream in.
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask a question in a new session and stream the answer
    Chat {
        /// The question to ask
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,

        /// Session title
        #[arg(short, long)]
        title: Option<String>,

        /// Enable deep research mode for the session
        #[arg(long)]
        deep_research: bool,

        /// Confirmed research direction to steer the answer
        #[arg(long, value_name = "TEXT")]
        direction: Option<String>,

        /// Use the built-in echo source instead of the model server
        #[arg(long)]
        offline: bool,
    },

    /// Project a JSON-lines event log and print the resulting sessions
    Replay {
        /// Event log file, one event per line
        file: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Validate configuration file
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["folio", "config", "show"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));
        assert!(!cli.json);
        assert!(cli.log.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["folio", "--json", "--log", "debug", "config", "path"]);
        assert!(cli.json);
        assert_eq!(cli.log, Some("debug".to_string()));
    }

    #[test]
    fn test_chat_command() {
        let cli = Cli::parse_from([
            "folio",
            "chat",
            "--title",
            "Sparse attention",
            "--offline",
            "what",
            "is",
            "new?",
        ]);
        if let Command::Chat {
            text,
            title,
            offline,
            deep_research,
            direction,
        } = cli.command
        {
            assert_eq!(text.join(" "), "what is new?");
            assert_eq!(title.as_deref(), Some("Sparse attention"));
            assert!(offline);
            assert!(!deep_research);
            assert!(direction.is_none());
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_chat_requires_text() {
        assert!(Cli::try_parse_from(["folio", "chat"]).is_err());
    }

    #[test]
    fn test_replay_command() {
        let cli = Cli::parse_from(["folio", "replay", "events.jsonl"]);
        if let Command::Replay { file } = cli.command {
            assert_eq!(file, PathBuf::from("events.jsonl"));
        } else {
            panic!("Expected Replay command");
        }
    }
}
