//! Error kinds shared by the model builder, resolver, and synthesizers (§7).
//!
//! The handling column in §7 is behavior owned by callers (the reconcile
//! loop decides whether to requeue, how to back off, and what to write to
//! input status); this enum only carries the kind and enough context to let
//! a caller make that decision.

use std::fmt;

/// A field or resource identity attached to an error for status reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorContext {
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub field: Option<String>,
}

impl ErrorContext {
    pub fn none() -> Self {
        Self {
            resource_type: None,
            resource_id: None,
            field: None,
        }
    }

    pub fn field(field: impl Into<String>) -> Self {
        Self {
            resource_type: None,
            resource_id: None,
            field: Some(field.into()),
        }
    }

    pub fn resource(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            resource_id: Some(resource_id.into()),
            field: None,
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.resource_type, &self.resource_id, &self.field) {
            (Some(t), Some(id), Some(field)) => write!(f, "{t}/{id}.{field}"),
            (Some(t), Some(id), None) => write!(f, "{t}/{id}"),
            (None, None, Some(field)) => write!(f, "{field}"),
            _ => Ok(()),
        }
    }
}

/// Error kinds from §7, in the order they appear in that table.
#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("validation error at {context}: {message}")]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("conflict at {context}: {message}")]
    Conflict {
        message: String,
        context: ErrorContext,
    },

    /// Should not occur given correct topological traversal; surfaced so
    /// callers can log it as an invariant violation rather than a normal
    /// retry.
    #[error("token not fulfilled: {context}")]
    TokenNotFulfilled { context: ErrorContext },

    #[error("AWS throttling on {context}: {message}")]
    AwsThrottling {
        message: String,
        context: ErrorContext,
    },

    #[error("AWS conflict on {context}: {message}")]
    AwsConflict {
        message: String,
        context: ErrorContext,
    },

    /// Not a failure: callers treat this as "desired missing" and continue.
    #[error("AWS resource not found: {context}")]
    AwsNotFound { context: ErrorContext },

    #[error("transient I/O error at {context}: {message}")]
    TransientIo {
        message: String,
        context: ErrorContext,
    },

    #[error("fatal error at {context}: {message}")]
    Fatal {
        message: String,
        context: ErrorContext,
    },
}

impl ControllerError {
    pub fn validation(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Validation {
            message: message.into(),
            context,
        }
    }

    pub fn conflict(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Conflict {
            message: message.into(),
            context,
        }
    }

    pub fn fatal(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Fatal {
            message: message.into(),
            context,
        }
    }

    /// Whether the reconcile loop should requeue with backoff rather than
    /// surface the error to input status and stop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TokenNotFulfilled { .. }
                | Self::AwsThrottling { .. }
                | Self::AwsConflict { .. }
                | Self::TransientIo { .. }
        )
    }

    /// A short, stable name for status conditions and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::Conflict { .. } => "ConflictError",
            Self::TokenNotFulfilled { .. } => "TokenNotFulfilled",
            Self::AwsThrottling { .. } => "AWSThrottling",
            Self::AwsConflict { .. } => "AWSConflict",
            Self::AwsNotFound { .. } => "AWSNotFound",
            Self::TransientIo { .. } => "TransientIO",
            Self::Fatal { .. } => "Fatal",
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
