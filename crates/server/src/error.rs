//! Error types for the drover server runtime.

use drover_protocol::{ErrorPayload, ValidationError};
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the server runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// No dispatcher registered for the guid. Common after a race between a
    /// client command and server-side disposal; callers treat it as benign.
    #[error("Object not found: {guid}")]
    UnknownObject { guid: String },

    /// Attempt to create a dispatcher under a disposed parent.
    #[error("Parent dispatcher is disposed: {guid}")]
    DisposedParent { guid: String },

    /// Parameters or result failed schema validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Timeout waiting for an operation.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Target was closed (browser, context, or page).
    #[error("Target closed: cannot perform operation on closed {target_type}. {context}")]
    TargetClosed {
        target_type: String,
        context: String,
    },

    /// Transport-level error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Domain-level failure forwarded from an underlying operation.
    #[error("{name}: {message}")]
    Domain {
        name: String,
        message: String,
        stack: Option<String>,
    },

    /// Channel closed unexpectedly.
    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that reflect a race between client intent and
    /// server-side disposal, which callers silently tolerate.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Error::UnknownObject { .. } | Error::TargetClosed { .. }
        )
    }

    /// True if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Domain { name, .. } => name == "TimeoutError",
            _ => false,
        }
    }

    /// The wire-level error kind name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::UnknownObject { .. } => "UnknownObject",
            Error::DisposedParent { .. } => "DisposedParent",
            Error::Validation(_) => "ValidationError",
            Error::Timeout(_) => "TimeoutError",
            Error::TargetClosed { .. } => "TargetClosedError",
            Error::Transport(_) => "TransportError",
            Error::Domain { .. } => "Error",
            Error::ChannelClosed => "ChannelClosed",
            Error::Io(_) => "IoError",
            Error::Json(_) => "JsonError",
        }
    }

    /// Converts into the structured payload sent over the wire.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Error::Domain {
                name,
                message,
                stack,
            } => ErrorPayload {
                message: message.clone(),
                name: Some(name.clone()),
                stack: stack.clone(),
            },
            other => ErrorPayload::new(other.kind_name(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_object_is_benign() {
        let err = Error::UnknownObject {
            guid: "page@1".to_string(),
        };
        assert!(err.is_benign());
        assert_eq!(err.to_payload().name.as_deref(), Some("UnknownObject"));
    }

    #[test]
    fn target_closed_is_benign() {
        let err = Error::TargetClosed {
            target_type: "page".to_string(),
            context: "click".to_string(),
        };
        assert!(err.is_benign());
        assert_eq!(err.to_payload().name.as_deref(), Some("TargetClosedError"));
    }

    #[test]
    fn domain_timeout_detected_by_name() {
        let err = Error::Domain {
            name: "TimeoutError".to_string(),
            message: "waiting for selector".to_string(),
            stack: None,
        };
        assert!(err.is_timeout());
        assert!(!err.is_benign());
        assert!(Error::Timeout("waiting for page@a".to_string()).is_timeout());
    }
}
