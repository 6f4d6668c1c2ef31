//! Session runtime and its composition root
//!
//! `SessionRuntime` wires the event bus, projector, streaming executor,
//! context builder and orchestrator together around one `RuntimeContext`.
//! `RuntimeSlot` makes bootstrapping idempotent: a second
//! `ensure_initialized` returns the runtime built by the first instead of
//! creating a fresh set of coordination state next to it.

pub mod context;

pub use context::RuntimeContext;

use sdk::command::Command;
use sdk::errors::RuntimeError;
use sdk::event::{Event, EventType};
use sdk::types::SessionId;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::command_bus::CommandBus;
use crate::config::{Config, StreamProvider};
use crate::context_builder::WindowedContextBuilder;
use crate::event_bus::EventBus;
use crate::llm::ollama::OllamaSource;
use crate::llm::scripted::ScriptedSource;
use crate::llm::StreamingTextSource;
use crate::orchestrator::{EventPipeline, Orchestrator, OrchestratorSettings};
use crate::projection::{Message, Projector, ReadModel, Session};
use crate::streaming::StreamingExecutor;

/// A fully wired session runtime
pub struct SessionRuntime {
    context: Arc<RuntimeContext>,
    bus: Arc<EventBus>,
    projector: Arc<Projector>,
    commands: CommandBus,
}

impl SessionRuntime {
    /// Build a runtime with its own coordination state
    pub fn new(config: &Config, source: Arc<dyn StreamingTextSource>) -> Self {
        Self::with_context(Arc::new(RuntimeContext::new()), config, source)
    }

    /// Build a runtime around an existing context
    ///
    /// The orchestrator is registered only if the context has not handed
    /// out its registration yet; otherwise the runtime has no handler and
    /// every dispatch fails with `HandlerNotRegistered`.
    pub fn with_context(
        context: Arc<RuntimeContext>,
        config: &Config,
        source: Arc<dyn StreamingTextSource>,
    ) -> Self {
        let bus = Arc::new(EventBus::with_buffer(config.bus.subscriber_buffer));
        let projector = Arc::new(Projector::new());
        let pipeline = Arc::new(EventPipeline::new(Arc::clone(&bus), Arc::clone(&projector)));
        let executor = Arc::new(StreamingExecutor::new(source));
        let context_builder = Arc::new(WindowedContextBuilder::new(
            Arc::clone(&projector) as _,
            config.session.system_prompt.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&context),
            pipeline,
            Arc::clone(&executor),
            context_builder,
            OrchestratorSettings::from_config(config),
        ));

        let commands = CommandBus::new();
        if context.claim_registration() {
            commands.register(orchestrator);
            info!(source = executor.source_name(), "Session runtime initialized");
        } else {
            warn!("Runtime context already has a registered orchestrator; not registering another");
        }

        Self {
            context,
            bus,
            projector,
            commands,
        }
    }

    /// Text source selected by `[stream] provider`
    pub fn source_for(config: &Config) -> Arc<dyn StreamingTextSource> {
        match config.stream.provider {
            StreamProvider::Ollama => Arc::new(OllamaSource::with_timeout(
                config.stream.base_url.clone(),
                config.stream.model.clone(),
                Duration::from_secs(config.stream.request_timeout_secs),
            )),
            StreamProvider::Scripted => Arc::new(ScriptedSource::echo()),
        }
    }

    /// Forward a command to the orchestrator
    pub async fn dispatch(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.dispatch(command).await
    }

    /// Parse a JSON command and dispatch it
    pub async fn dispatch_json(&self, json: &str) -> Result<(), RuntimeError> {
        self.dispatch(Command::from_json(json)?).await
    }

    pub fn get_sessions(&self) -> Vec<Session> {
        self.projector.get_sessions()
    }

    pub fn get_messages(&self, session_id: &SessionId) -> Vec<Message> {
        self.projector.get_messages(session_id)
    }

    pub fn get_session(&self, session_id: &SessionId) -> Option<Session> {
        self.projector.get_session(session_id)
    }

    pub fn snapshot(&self) -> ReadModel {
        self.projector.snapshot()
    }

    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        self.bus.subscribe(event_type).await
    }

    /// Every event published so far, in publish order
    pub async fn events(&self) -> Vec<Event> {
        self.bus.events().await
    }

    pub async fn events_for(&self, session_id: &SessionId) -> Vec<Event> {
        self.bus.events_for(session_id).await
    }

    pub fn is_running(&self, session_id: &SessionId) -> bool {
        self.context.is_running(session_id)
    }

    /// Wait until the session's run, if any, has finished and its terminal
    /// event is projected
    pub async fn wait_idle(&self, session_id: &SessionId) {
        self.context.wait_idle(session_id).await;
    }

    pub fn context(&self) -> &Arc<RuntimeContext> {
        &self.context
    }
}

/// Holder for the process's single runtime
///
/// Usable as a `static`.
#[derive(Default)]
pub struct RuntimeSlot {
    runtime: OnceLock<Arc<SessionRuntime>>,
}

impl RuntimeSlot {
    pub const fn new() -> Self {
        Self {
            runtime: OnceLock::new(),
        }
    }

    /// Return the slot's runtime, building it on first use
    ///
    /// Later calls ignore their arguments and return the existing runtime.
    pub fn ensure_initialized(
        &self,
        config: &Config,
        source: Arc<dyn StreamingTextSource>,
    ) -> Arc<SessionRuntime> {
        if let Some(runtime) = self.runtime.get() {
            tracing::debug!("Reusing initialized session runtime");
            return Arc::clone(runtime);
        }

        let runtime = self
            .runtime
            .get_or_init(|| Arc::new(SessionRuntime::new(config, source)));
        Arc::clone(runtime)
    }

    pub fn get(&self) -> Option<Arc<SessionRuntime>> {
        self.runtime.get().cloned()
    }
}
