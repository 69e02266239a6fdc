//! Error types for the Foldline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; [`Error`] wraps them all.

use thiserror::Error;

/// The top-level error type for all Foldline operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Event log / payload validation ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Provider transport ---
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    // --- Tool implementations ---
    #[error("Tool execution error: {0}")]
    ToolExecution(#[from] ToolExecutionError),

    // --- Tool resolution ---
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    // --- Request discipline ---
    #[error("Concurrency violation: {0}")]
    Concurrency(#[from] ConcurrencyViolation),

    // --- Persistence collaborator ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // --- Engine construction ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// A malformed event, tool spec, or out-of-order log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("event index {found} is not greater than previous index {previous}")]
    OutOfOrder { previous: u64, found: u64 },

    #[error("no core or slice definition claims event type '{0}'")]
    UnknownEventType(String),

    #[error("malformed '{event_type}' payload: {reason}")]
    MalformedEvent { event_type: String, reason: String },

    #[error("event type '{event_type}' claimed by slice '{slice}' is already claimed")]
    DuplicateEventType { event_type: String, slice: String },

    #[error("malformed tool spec: {0}")]
    MalformedToolSpec(String),
}

/// A failure in the provider transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("could not obtain a model client: {0}")]
    ClientUnavailable(String),

    #[error("could not open stream: {0}")]
    Open(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("provider reported error: {0}")]
    Provider(String),

    #[error("stream closed before the response completed")]
    ClosedEarly,
}

/// A tool implementation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolExecutionError {
    #[error("{tool_name} failed: {reason}")]
    Failed { tool_name: String, reason: String },

    #[error("invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("{tool_name} panicked: {message}")]
    Panicked { tool_name: String, message: String },
}

impl ToolExecutionError {
    pub fn failed(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}

/// No implementation is registered for a requested tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no implementation registered for {kind} tool '{tool}'")]
    Unresolved { tool: String, kind: String },

    #[error("tool '{0}' is not available in this request")]
    UnknownTool(String),

    #[error("more than one tool resolves to the name '{0}'")]
    DuplicateName(String),
}

/// Defensive detection of a second concurrently open request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcurrencyViolation {
    #[error("request '{attempted}' started while '{open}' is still open")]
    RequestAlreadyOpen { open: String, attempted: String },
}

/// The persistence collaborator rejected a write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("could not load events: {0}")]
    Load(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_displays_indices() {
        let err = Error::Validation(ValidationError::OutOfOrder {
            previous: 4,
            found: 3,
        });
        assert!(err.to_string().contains("index 3"));
        assert!(err.to_string().contains("previous index 4"));
    }

    #[test]
    fn dispatch_error_names_the_tool() {
        let err = Error::from(DispatchError::Unresolved {
            tool: "lookup_order".into(),
            kind: "serialized_callable_tool".into(),
        });
        assert!(err.to_string().contains("lookup_order"));
        assert!(err.to_string().contains("serialized_callable_tool"));
    }

    #[test]
    fn panic_message_reads_both_payload_kinds() {
        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("index out of range"));
        let literal: Box<dyn std::any::Any + Send> = Box::new("tool blew up");
        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(owned.as_ref()), "index out of range");
        assert_eq!(panic_message(literal.as_ref()), "tool blew up");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
