use poem::{Response, http::StatusCode};
use serde::Serialize;
use tracing::error;

use crate::domain::errors::{DomainError, ErrorKind};

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    pub status: u16,
    pub title: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_handle: Option<String>,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::ExternalDependency => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Permanent | ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn problem_details(err: &DomainError) -> ProblemDetails {
    let kind = err.kind();
    let content_handle = match err {
        DomainError::ProcessingNotScheduled { content_handle, .. } => {
            Some(content_handle.to_string())
        }
        _ => None,
    };
    let detail = match kind {
        // Internal failures are logged, not echoed to clients.
        ErrorKind::Unexpected => "An unexpected error occurred".to_string(),
        _ => err.to_string(),
    };
    ProblemDetails {
        status: status_for(kind).as_u16(),
        title: kind.code(),
        detail,
        reason: err.reason(),
        content_handle,
    }
}

/// Converts a domain error into an `application/problem+json` response.
pub fn problem(err: DomainError) -> poem::Error {
    if err.kind() == ErrorKind::Unexpected {
        error!(error = %format!("{err:#}"), "request failed");
    }
    let details = problem_details(&err);
    let body = serde_json::to_vec(&details).unwrap_or_default();
    let response = Response::builder()
        .status(status_for(err.kind()))
        .content_type(PROBLEM_CONTENT_TYPE)
        .body(body);
    poem::Error::from_response(response)
}
