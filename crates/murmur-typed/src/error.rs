//! Error types for the typed-event layer.

use serde::ser::Error as _;
use thiserror::Error;

use crate::registry::VariantTag;

/// Boxed cause carried by wrapping errors. Factories may fail with any error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A variant's domain rule failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{field}: {}", message.into());
        Self {
            field: Some(field),
            message,
        }
    }
}

/// An event could not be turned into its data object.
#[derive(Debug, Error)]
#[error("serialization failed: {source}")]
pub struct SerializationError {
    #[from]
    source: serde_json::Error,
}

impl SerializationError {
    pub fn custom(message: impl std::fmt::Display) -> Self {
        Self {
            source: serde_json::Error::custom(message),
        }
    }
}

/// Errors that can occur in typed-event operations.
#[derive(Debug, Error)]
pub enum TypedEventError {
    #[error("broadcast of `{type_id}` failed: {source}")]
    Broadcast {
        type_id: String,
        #[source]
        source: BoxError,
    },
    #[error("event type id must not be empty")]
    EmptyTypeId,
    #[error("type id `{type_id}` is already bound to {existing}; cannot bind it to {attempted}")]
    RegistrationConflict {
        type_id: String,
        existing: VariantTag,
        attempted: VariantTag,
    },
    #[error("factory for `{type_id}` failed: {source}")]
    RegistryFactory {
        type_id: String,
        #[source]
        source: BoxError,
    },
    #[error("failed to decode `{type_id}` from stream: {source}")]
    StreamDecode {
        type_id: String,
        #[source]
        source: BoxError,
    },
    #[error("no type id registered for variant {variant}")]
    UnregisteredType { variant: VariantTag },
}

impl TypedEventError {
    /// The wire type id this error concerns, when it names one.
    pub fn type_id(&self) -> Option<&str> {
        match self {
            Self::Broadcast { type_id, .. }
            | Self::RegistrationConflict { type_id, .. }
            | Self::RegistryFactory { type_id, .. }
            | Self::StreamDecode { type_id, .. } => Some(type_id),
            Self::EmptyTypeId | Self::UnregisteredType { .. } => None,
        }
    }
}

/// Convenience result type for typed-event operations.
pub type TypedEventResult<T> = Result<T, TypedEventError>;
