//! Event emission: publish to the bus, then project
//!
//! Every event the orchestrator issues goes through `EventPipeline::emit`,
//! which publishes the event and applies it to the read model before the
//! next emission can start. Publish order and projection order are
//! therefore identical.

use async_trait::async_trait;
use sdk::event::{Event, EventPayload};
use sdk::types::{MessageId, SessionId};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::event_bus::EventBus;
use crate::projection::Projector;
use crate::runtime::RuntimeContext;
use crate::streaming::StreamCallbacks;

/// Ordered publish-then-project sink
pub struct EventPipeline {
    bus: Arc<EventBus>,
    projector: Arc<Projector>,
    gate: Mutex<()>,
}

impl EventPipeline {
    pub fn new(bus: Arc<EventBus>, projector: Arc<Projector>) -> Self {
        Self {
            bus,
            projector,
            gate: Mutex::new(()),
        }
    }

    /// Publish `payload` for `session_id` and project it
    pub async fn emit(&self, session_id: &SessionId, payload: EventPayload) -> Event {
        let event = Event::new(session_id.clone(), payload);
        let _gate = self.gate.lock().await;

        self.bus.publish(event.clone()).await;
        self.projector.apply(&event);

        tracing::trace!(
            event_id = %event.id,
            session_id = %event.session_id,
            event_type = ?event.event_type(),
            "Event emitted"
        );
        event
    }
}

/// Translates one run's callbacks into assistant-message events
pub struct RunEmitter {
    session_id: SessionId,
    message_id: MessageId,
    run_id: Uuid,
    pipeline: Arc<EventPipeline>,
    context: Arc<RuntimeContext>,
}

impl RunEmitter {
    pub fn new(
        session_id: SessionId,
        message_id: MessageId,
        run_id: Uuid,
        pipeline: Arc<EventPipeline>,
        context: Arc<RuntimeContext>,
    ) -> Self {
        Self {
            session_id,
            message_id,
            run_id,
            pipeline,
            context,
        }
    }

    /// Release the run slot, then publish the terminal event
    ///
    /// The slot is freed first so an observer reacting to the terminal
    /// event can start a new run right away.
    async fn finish(&self, payload: EventPayload) {
        self.context.finish_run(&self.session_id, self.run_id);
        self.pipeline.emit(&self.session_id, payload).await;
        self.context.settle_run(&self.session_id);
    }
}

#[async_trait]
impl StreamCallbacks for RunEmitter {
    async fn on_start(&self) {
        self.pipeline
            .emit(
                &self.session_id,
                EventPayload::AssistantMessageStarted {
                    message_id: self.message_id.clone(),
                },
            )
            .await;
    }

    async fn on_delta(&self, delta: String) {
        self.pipeline
            .emit(
                &self.session_id,
                EventPayload::AssistantMessageDelta {
                    message_id: self.message_id.clone(),
                    delta,
                },
            )
            .await;
    }

    async fn on_done(&self) {
        tracing::info!(
            session_id = %self.session_id,
            message_id = %self.message_id,
            run_id = %self.run_id,
            "Assistant message completed"
        );
        self.finish(EventPayload::AssistantMessageCompleted {
            message_id: self.message_id.clone(),
        })
        .await;
    }

    async fn on_abort(&self, reason: String) {
        tracing::info!(
            session_id = %self.session_id,
            message_id = %self.message_id,
            run_id = %self.run_id,
            reason = %reason,
            "Assistant message aborted"
        );
        self.finish(EventPayload::AssistantMessageAborted {
            message_id: self.message_id.clone(),
            reason,
        })
        .await;
    }

    async fn on_error(&self, message: String) {
        tracing::warn!(
            session_id = %self.session_id,
            message_id = %self.message_id,
            run_id = %self.run_id,
            error = %message,
            "Assistant message failed"
        );
        self.finish(EventPayload::AssistantMessageFailed {
            message_id: self.message_id.clone(),
            error: message,
        })
        .await;
    }
}
