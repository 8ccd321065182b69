//! Repository implementations for database operations.
//!
//! Each repository implements one of the `domain::stores` traits.

pub mod device;
pub mod device_request;
pub mod user;

pub use device::DeviceRepository;
pub use device_request::DeviceRequestRepository;
pub use user::UserRepository;

use domain::DomainError;

/// PostgreSQL error code for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for foreign_key_violation.
const FOREIGN_KEY_VIOLATION: &str = "23503";

fn has_code(err: &sqlx::Error, code: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(code),
        _ => false,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    has_code(err, UNIQUE_VIOLATION)
}

pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    has_code(err, FOREIGN_KEY_VIOLATION)
}

pub(crate) fn storage_error(err: sqlx::Error) -> DomainError {
    tracing::error!(error = %err, "Database error");
    DomainError::Storage(err.to_string())
}

/// Escapes `ILIKE` wildcards so user input matches literally.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("Austin"), "Austin");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_non_database_errors_have_no_code() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_foreign_key_violation(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_storage_error_mapping() {
        let err = storage_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DomainError::Storage(_)));
    }
}
