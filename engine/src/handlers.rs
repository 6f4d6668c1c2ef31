//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - chat: Create a session, ask one question and stream the answer
//! - replay: Project a JSON-lines event log into a read model
//! - config: Show, locate or validate the configuration

use anyhow::{Context, Result};
use sdk::command::Command;
use sdk::errors::RuntimeError;
use sdk::event::{Event, EventPayload, EventType};
use sdk::types::{MessageStatus, Role, SessionId};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::ConfigAction;
use crate::config::Config;
use crate::llm::scripted::ScriptedSource;
use crate::llm::StreamingTextSource;
use crate::projection::{ReadModel, Session};
use crate::runtime::{RuntimeSlot, SessionRuntime};

static RUNTIME: RuntimeSlot = RuntimeSlot::new();

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Options of a `chat` invocation
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub text: String,
    pub title: Option<String>,
    pub deep_research: bool,
    pub direction: Option<String>,
    pub offline: bool,
}

/// Ask one question in a fresh session and stream the answer
///
/// Deltas are printed as they arrive in text mode. Ctrl-C stops the run;
/// the partial answer is kept and reported as aborted.
pub async fn handle_chat(request: ChatRequest, config: &Config, format: OutputFormat) -> Result<()> {
    let source: Arc<dyn StreamingTextSource> = if request.offline {
        Arc::new(ScriptedSource::echo())
    } else {
        SessionRuntime::source_for(config)
    };
    let runtime = RUNTIME.ensure_initialized(config, source);

    let session_id = SessionId::generate();
    let title = request
        .title
        .clone()
        .unwrap_or_else(|| config.session.default_title.clone());

    runtime
        .dispatch(Command::create_session(Some(session_id.clone()), title))
        .await
        .context("Failed to create session")?;

    if request.deep_research {
        runtime
            .dispatch(Command::toggle_deep_research(session_id.clone(), true))
            .await
            .context("Failed to enable deep research")?;
    }

    if let Some(direction) = &request.direction {
        runtime
            .dispatch(Command::confirm_research_direction(
                session_id.clone(),
                direction.clone(),
            ))
            .await
            .context("Failed to confirm research direction")?;
    }

    let mut events = runtime.subscribe(EventType::All).await;
    runtime
        .dispatch(Command::send_message(session_id.clone(), request.text.clone()))
        .await
        .context("Failed to send message")?;

    let idle = runtime.wait_idle(&session_id);
    tokio::pin!(idle);
    let mut stop_sent = false;

    loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => {
                if event.session_id != session_id {
                    continue;
                }
                if let (OutputFormat::Text, EventPayload::AssistantMessageDelta { delta, .. }) =
                    (format, &event.payload)
                {
                    print!("{}", delta);
                    std::io::stdout().flush().ok();
                }
                if event.is_run_terminal() {
                    break;
                }
            }
            _ = &mut idle => break,
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                tracing::info!(session_id = %session_id, "Interrupted, stopping run");
                runtime
                    .dispatch(Command::stop_streaming(session_id.clone()))
                    .await
                    .context("Failed to stop streaming")?;
                stop_sent = true;
            }
        }
    }
    runtime.wait_idle(&session_id).await;

    let session = runtime
        .get_session(&session_id)
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;
    let answer = session
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .ok_or_else(|| anyhow::anyhow!("No assistant answer was started"))?;

    match format {
        OutputFormat::Text => {
            println!();
            println!();
            match answer.status {
                MessageStatus::Done => println!("✓ Answer complete"),
                MessageStatus::Aborted => println!("✗ Answer stopped"),
                _ => println!(
                    "✗ Answer failed: {}",
                    answer.error.as_deref().unwrap_or("unknown error")
                ),
            }
            println!("  Session: {} ({})", session.title, session.id);
        }
        OutputFormat::Json => {
            let output = json!({
                "session": session.id,
                "title": session.title,
                "status": answer.status,
                "answer": answer.content,
                "error": answer.error,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    if answer.status == MessageStatus::Failed {
        let error = answer.error.clone().unwrap_or_else(|| "unknown error".to_string());
        return Err(RuntimeError::Stream(error).into());
    }
    Ok(())
}

/// Parse a JSON-lines event log; blank lines are skipped
pub fn read_event_log(path: &Path) -> Result<Vec<Event>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log {}", path.display()))?;

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Event>(line)
                .with_context(|| format!("Invalid event on line {}", index + 1))
        })
        .collect()
}

/// Replay an event log and show the projected sessions
pub async fn handle_replay(file: PathBuf, format: OutputFormat) -> Result<()> {
    let events = read_event_log(&file)?;
    let model = ReadModel::replay(&events);
    let sessions: Vec<&Session> = model.sessions();

    match format {
        OutputFormat::Text => {
            println!("Replayed {} events from {}", events.len(), file.display());
            println!();

            if sessions.is_empty() {
                println!("No sessions");
                return Ok(());
            }

            for session in sessions {
                println!("Session {}: {}", session.id, session.title);
                if session.deep_research_enabled {
                    println!("  Deep research: on");
                }
                if let Some(direction) = &session.confirmed_direction {
                    println!("  Direction: {}", direction);
                }
                for message in &session.messages {
                    println!(
                        "  [{:?}/{:?}] {}",
                        message.role, message.status, message.content
                    );
                    if let Some(error) = &message.error {
                        println!("    ({})", error);
                    }
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "event_count": events.len(),
                "sessions": sessions,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show, locate or validate the configuration
pub async fn handle_config(
    action: ConfigAction,
    config: &Config,
    config_path: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path().context("Failed to locate configuration")?,
    };

    match action {
        ConfigAction::Show => match format {
            OutputFormat::Text => {
                let rendered =
                    toml::to_string_pretty(config).context("Failed to render configuration")?;
                println!("{}", rendered);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(config)?);
            }
        },
        ConfigAction::Path => match format {
            OutputFormat::Text => println!("{}", path.display()),
            OutputFormat::Json => println!("{}", json!({ "path": path })),
        },
        ConfigAction::Validate => {
            Config::load_from_path(&path)
                .with_context(|| format!("Invalid configuration at {}", path.display()))?;
            match format {
                OutputFormat::Text => println!("✓ Configuration is valid: {}", path.display()),
                OutputFormat::Json => println!("{}", json!({ "valid": true, "path": path })),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::MessageId;

    #[test]
    fn test_read_event_log_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let session = SessionId::from("S1");
        let lines = [
            Event::new(
                session.clone(),
                EventPayload::SessionCreated {
                    title: "T".to_string(),
                },
            ),
            Event::new(
                session,
                EventPayload::UserMessageAdded {
                    message_id: MessageId::from("U1"),
                    text: "hi".to_string(),
                },
            ),
        ]
        .iter()
        .map(|e| serde_json::to_string(e).unwrap())
        .collect::<Vec<_>>()
        .join("\n\n");
        std::fs::write(&path, lines).unwrap();

        let events = read_event_log(&path).unwrap();
        assert_eq!(events.len(), 2);

        let model = ReadModel::replay(&events);
        assert_eq!(model.sessions()[0].messages[0].content, "hi");
    }

    #[test]
    fn test_read_event_log_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"not\":\"an event\"}\n").unwrap();

        let err = read_event_log(&path).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[tokio::test]
    async fn test_offline_chat_completes() {
        let request = ChatRequest {
            text: "hello there".to_string(),
            offline: true,
            ..Default::default()
        };
        handle_chat(request, &Config::default(), OutputFormat::Json)
            .await
            .unwrap();
    }
}
