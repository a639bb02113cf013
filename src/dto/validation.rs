//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest accepted display name, in characters.
pub const MAX_USERNAME_CHARS: usize = 32;

/// Validates that a username is non-blank and at most [`MAX_USERNAME_CHARS`] characters.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        let mut err = ValidationError::new("username_blank");
        err.message = Some("Username must not be blank".into());
        return Err(err);
    }

    let chars = username.chars().count();
    if chars > MAX_USERNAME_CHARS {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("Username must be at most {MAX_USERNAME_CHARS} characters (got {chars})").into(),
        );
        return Err(err);
    }

    Ok(())
}
