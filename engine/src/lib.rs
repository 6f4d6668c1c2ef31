//! Folio Engine Library
//!
//! This library provides the session runtime of the Folio research
//! assistant: commands in, events out, a projected read model for the UI,
//! and cancellable streaming runs against a text source.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Text-stream collaborator abstraction and adapters
pub mod llm;

/// Event bus for publishing domain events
pub mod event_bus;

/// Read model projection
pub mod projection;

/// Command dispatch
pub mod command_bus;

/// Cancellable streaming runs
pub mod streaming;

/// Assistant prompt assembly
pub mod context_builder;

/// Coordination state and composition root
pub mod runtime;

/// Session state machine
pub mod orchestrator;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
