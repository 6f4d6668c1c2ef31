//! Folio SDK
//!
//! Shared vocabulary of the Folio session runtime: identifiers, commands,
//! events and the error taxonomy. Used by the engine and by any UI layer
//! that builds commands or renders events.

/// Commands accepted by the runtime
pub mod command;

/// Error types and handling
pub mod errors;

/// Events emitted by the runtime
pub mod event;

/// Identifiers and message vocabulary
pub mod types;

// Re-export commonly used types
pub use command::{Command, CommandKind};
pub use errors::{ErrorExt, RuntimeError};
pub use event::{Event, EventPayload, EventType};
pub use types::{CommandId, MessageId, MessageStatus, Role, SessionId};
