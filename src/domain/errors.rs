use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::ContentHandle;

/// Error classes shared by the HTTP surface, the dispatcher and the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    ExternalDependency,
    Permanent,
    Unexpected,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ExternalDependency => "external_dependency",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Unexpected => "unexpected",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::ExternalDependency)
    }
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Entity already exists: {0}")]
    AlreadyExists(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Content store unavailable: {0}")]
    ContentStore(String),
    #[error(
        "Document is stored as '{content_handle}' but processing was not scheduled: {reason}"
    )]
    ProcessingNotScheduled {
        content_handle: ContentHandle,
        document_id: Uuid,
        reason: String,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::AlreadyExists(_) | DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::ContentStore(_) | DomainError::ProcessingNotScheduled { .. } => {
                ErrorKind::ExternalDependency
            }
            DomainError::Other(_) => ErrorKind::Unexpected,
        }
    }

    /// Finer-grained reason for kinds that cover more than one situation.
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            DomainError::ContentStore(_) => Some("content_store_unavailable"),
            DomainError::ProcessingNotScheduled { .. } => Some("processing_not_scheduled"),
            _ => None,
        }
    }
}
