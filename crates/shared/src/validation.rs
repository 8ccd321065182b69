//! Common validation utilities.
//!
//! These are meant to be plugged into `#[validate(custom(function = ...))]`.

use validator::ValidationError;

/// Maximum length of a stored photo reference.
const MAX_PHOTO_REFERENCE_LENGTH: usize = 2048;

/// Validates that a string contains something other than whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates a contact phone number.
///
/// Accepts digits with the usual separators and an optional leading `+`,
/// between 7 and 15 digits in total.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let allowed = body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'));
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();

    if allowed && (7..=15).contains(&digits) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Phone number must contain 7 to 15 digits".into());
        Err(err)
    }
}

/// Validates a list of photo references returned by the blob store.
pub fn validate_photo_references(photos: &[String]) -> Result<(), ValidationError> {
    for photo in photos {
        if photo.is_empty()
            || photo.len() > MAX_PHOTO_REFERENCE_LENGTH
            || photo.chars().any(char::is_whitespace)
        {
            let mut err = ValidationError::new("photo_reference");
            err.message = Some("Photo references must be non-empty and contain no whitespace".into());
            return Err(err);
        }
    }
    Ok(())
}
