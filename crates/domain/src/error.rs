//! Domain error taxonomy.

use thiserror::Error;

use crate::models::device_request::ExistingRequest;

pub type DomainResult<T> = Result<T, DomainError>;

/// Errors returned by the catalog and request engine.
///
/// Every variant is reported synchronously to the caller; none is retried.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Device not available: {0}")]
    DeviceNotAvailable(String),

    /// An active request already exists for this requester and device.
    /// Details are `None` only if the conflicting row vanished before it could be re-read.
    #[error("You already have an active request for this device")]
    DuplicateRequest(Option<ExistingRequest>),

    #[error("Maximum of {limit} active requests reached")]
    QuotaExceeded { active: i64, limit: i64 },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// The record changed between read and write.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_messages(&errors, "", &mut messages);
        messages.sort();

        if messages.is_empty() {
            DomainError::InvalidInput("Invalid request body".to_string())
        } else {
            DomainError::InvalidInput(messages.join("; "))
        }
    }
}

/// Flattens nested validation errors into `path: message` lines, with
/// paths in the request's camelCase field names (`contactInfo.email`).
fn collect_messages(errors: &validator::ValidationErrors, prefix: &str, out: &mut Vec<String>) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            camel_case(field)
        } else {
            format!("{}.{}", prefix, camel_case(field))
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                out.extend(field_errors.iter().map(|e| match &e.message {
                    Some(message) => format!("{}: {}", path, message),
                    None => format!("{}: invalid value", path),
                }));
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(nested, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_messages(nested, &format!("{}[{}]", path, index), out);
                }
            }
        }
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
