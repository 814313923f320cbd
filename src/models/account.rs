//! Authentication shapes: identities, sessions and the forms that create them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

/// Minimum password length accepted at registration and password change.
pub const MIN_PASSWORD_LEN: usize = 6;

/// An authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// Bearer session issued by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user: Identity,
}

/// Registration form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl Registration {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.email.trim().is_empty() {
            return Err(AppError::Validation("Email is required".to_string()));
        }
        validate_new_password(&self.password, &self.confirm_password)
    }
}

/// Password change form of the security settings.
#[derive(Debug, Clone, Default)]
pub struct PasswordChange {
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_new_password(&self.new_password, &self.confirm_password)
    }
}

/// Shared by registration and password change: confirmation must match, then length.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), AppError> {
    if password != confirmation {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    validate_password_length(password)
}

pub fn validate_password_length(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(password: &str) -> Registration {
        Registration {
            full_name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            password: password.to_string(),
            confirm_password: password.to_string(),
        }
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            registration("abc").validate(),
            Err(AppError::Validation(_))
        ));
        assert!(registration("abcdef").validate().is_ok());
    }

    #[test]
    fn test_confirmation_mismatch_rejected() {
        let mut form = registration("abcdef");
        form.confirm_password = "abcdeg".to_string();
        assert_eq!(
            form.validate(),
            Err(AppError::Validation("Passwords do not match".to_string()))
        );
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        assert!(validate_password_length("ñandú1").is_ok());
        assert!(validate_password_length("ñandú").is_err());
    }
}
