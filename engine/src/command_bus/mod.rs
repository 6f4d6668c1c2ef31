//! Command bus: the single dispatch point for state changes
//!
//! The bus forwards each command to the one registered handler and returns
//! whatever the handler returns. It performs no retries, no queuing and no
//! validation. Exactly one handler can be installed for the lifetime of the
//! bus; later registrations are ignored.

use async_trait::async_trait;
use sdk::command::Command;
use sdk::errors::RuntimeError;
use std::sync::{Arc, OnceLock};

/// Receives every dispatched command
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one command; returns once handling completes
    async fn handle(&self, command: Command) -> Result<(), RuntimeError>;
}

/// Single-handler command dispatcher
#[derive(Default)]
pub struct CommandBus {
    handler: OnceLock<Arc<dyn CommandHandler>>,
}

impl CommandBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler
    ///
    /// Returns `false`, leaving the existing handler in place, if one was
    /// already registered.
    pub fn register(&self, handler: Arc<dyn CommandHandler>) -> bool {
        if self.handler.set(handler).is_err() {
            tracing::warn!("Command handler already registered; ignoring re-registration");
            return false;
        }
        true
    }

    pub fn is_registered(&self) -> bool {
        self.handler.get().is_some()
    }

    /// Forward `command` to the registered handler
    ///
    /// # Errors
    ///
    /// `RuntimeError::HandlerNotRegistered` if no handler is installed,
    /// otherwise whatever the handler returns.
    pub async fn dispatch(&self, command: Command) -> Result<(), RuntimeError> {
        let handler = self
            .handler
            .get()
            .ok_or(RuntimeError::HandlerNotRegistered)?;

        tracing::debug!(
            command_id = %command.id,
            command_type = command.name(),
            "Dispatching command"
        );

        handler.handle(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl CommandHandler for Recorder {
        async fn handle(&self, command: Command) -> Result<(), RuntimeError> {
            self.seen.lock().unwrap().push(command.id.to_string());
            if self.fail {
                return Err(RuntimeError::InvalidCommand("rejected".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatch_without_handler() {
        let bus = CommandBus::new();
        let result = bus.dispatch(Command::stop_streaming("S1")).await;
        assert!(matches!(result, Err(RuntimeError::HandlerNotRegistered)));
    }

    #[tokio::test]
    async fn test_dispatch_forwards_to_handler() {
        let bus = CommandBus::new();
        let recorder = Arc::new(Recorder::default());
        assert!(bus.register(recorder.clone()));

        bus.dispatch(Command::send_message("S1", "hi").with_id("C1"))
            .await
            .unwrap();

        assert_eq!(*recorder.seen.lock().unwrap(), vec!["C1".to_string()]);
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let bus = CommandBus::new();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        assert!(bus.register(first.clone()));
        assert!(!bus.register(second.clone()));

        bus.dispatch(Command::stop_streaming("S1")).await.unwrap();
        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert!(second.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_errors_propagate() {
        let bus = CommandBus::new();
        bus.register(Arc::new(Recorder {
            fail: true,
            ..Default::default()
        }));

        let result = bus.dispatch(Command::stop_streaming("S1")).await;
        assert!(matches!(result, Err(RuntimeError::InvalidCommand(_))));
    }
}
