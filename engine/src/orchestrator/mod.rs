//! Orchestrator: the session state machine
//!
//! Translates commands into events and coordinates the streaming run that
//! answers each user message. Two rules are enforced here:
//!
//! - **idempotency**: a `SendMessage` whose command id was already handled
//!   is dropped without emitting anything
//! - **single-flight**: a session has at most one live run; a message sent
//!   while one is active is recorded but does not start a second run
//!
//! Duplicates and conflicts are logged, never returned as errors.

pub mod emitter;

use async_trait::async_trait;
use sdk::command::{Command, CommandKind};
use sdk::errors::RuntimeError;
use sdk::event::EventPayload;
use sdk::types::{MessageId, SessionId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::command_bus::CommandHandler;
use crate::config::Config;
use crate::context_builder::ContextBuilder;
use crate::llm::StreamOptions;
use crate::runtime::RuntimeContext;
use crate::streaming::{StreamRequest, StreamingExecutor};

pub use emitter::{EventPipeline, RunEmitter};

/// Orchestrator tuning taken from configuration
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Dialogue turns handed to the context builder
    pub context_window: usize,

    /// Title for sessions created without one
    pub default_title: String,

    pub stream_options: StreamOptions,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            context_window: config.session.context_window,
            default_title: config.session.default_title.clone(),
            stream_options: StreamOptions {
                model_override: None,
                temperature: config.stream.temperature,
                batching_interval_ms: config.stream.batching_interval_ms,
            },
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Command handler driving sessions and their assistant runs
pub struct Orchestrator {
    context: Arc<RuntimeContext>,
    pipeline: Arc<EventPipeline>,
    executor: Arc<StreamingExecutor>,
    context_builder: Arc<dyn ContextBuilder>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        context: Arc<RuntimeContext>,
        pipeline: Arc<EventPipeline>,
        executor: Arc<StreamingExecutor>,
        context_builder: Arc<dyn ContextBuilder>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            context,
            pipeline,
            executor,
            context_builder,
            settings,
        }
    }

    async fn send_message(
        &self,
        command: &Command,
        session_id: &SessionId,
        text: &str,
    ) -> Result<(), RuntimeError> {
        if !self.context.mark_handled(&command.id) {
            warn!(
                command_id = %command.id,
                session_id = %session_id,
                "Duplicate command ignored"
            );
            return Ok(());
        }

        self.pipeline
            .emit(
                session_id,
                EventPayload::UserMessageAdded {
                    message_id: MessageId::generate(),
                    text: text.to_string(),
                },
            )
            .await;

        let messages = self
            .context_builder
            .build_assistant_messages(session_id, text, self.settings.context_window)
            .await?;

        let Some(handle) = self.context.begin_run(session_id) else {
            info!(
                command_id = %command.id,
                session_id = %session_id,
                "Run already active for session, not starting another"
            );
            return Ok(());
        };

        let message_id = MessageId::generate();
        info!(
            command_id = %command.id,
            session_id = %session_id,
            message_id = %message_id,
            run_id = %handle.run_id(),
            source = self.executor.source_name(),
            "Starting assistant run"
        );

        let callbacks = Arc::new(RunEmitter::new(
            session_id.clone(),
            message_id,
            handle.run_id(),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.context),
        ));
        let request = StreamRequest {
            messages,
            options: self.settings.stream_options.clone(),
        };
        self.executor.launch(&handle, request, callbacks);

        Ok(())
    }
}

#[async_trait]
impl CommandHandler for Orchestrator {
    async fn handle(&self, command: Command) -> Result<(), RuntimeError> {
        debug!(command_id = %command.id, command_type = command.name(), "Handling command");

        match &command.kind {
            CommandKind::CreateSession { title } => {
                let session_id = command
                    .session_id
                    .clone()
                    .unwrap_or_else(SessionId::generate);
                let title = title
                    .clone()
                    .unwrap_or_else(|| self.settings.default_title.clone());

                info!(session_id = %session_id, title = %title, "Creating session");
                self.pipeline
                    .emit(&session_id, EventPayload::SessionCreated { title })
                    .await;
            }
            CommandKind::RenameSession { title } => {
                let session_id = command.require_session()?;
                self.pipeline
                    .emit(
                        session_id,
                        EventPayload::SessionRenamed {
                            title: title.clone(),
                        },
                    )
                    .await;
            }
            CommandKind::ToggleDeepResearch { enabled } => {
                let session_id = command.require_session()?;
                self.pipeline
                    .emit(
                        session_id,
                        EventPayload::DeepResearchModeChanged { enabled: *enabled },
                    )
                    .await;
            }
            CommandKind::ConfirmResearchDirection { direction } => {
                let session_id = command.require_session()?;
                self.pipeline
                    .emit(
                        session_id,
                        EventPayload::ResearchDirectionConfirmed {
                            direction: direction.clone(),
                        },
                    )
                    .await;
            }
            CommandKind::SendMessage { text } => {
                let session_id = command.require_session()?;
                self.send_message(&command, session_id, text).await?;
            }
            CommandKind::StopStreaming {} => {
                let session_id = command.require_session()?;
                if self.context.abort(session_id) {
                    info!(session_id = %session_id, "Abort requested for live run");
                } else {
                    debug!(session_id = %session_id, "No live run to stop");
                }
            }
        }

        Ok(())
    }
}
