/**
 * Registration Input Rules
 *
 * Normalisation and validation applied before anything touches the store.
 */

use crate::backend::error::BackendError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_NAME_LEN: usize = 100;

/// Trimmed, lower-cased email
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// One `@`, a non-empty local part and a dotted domain
pub fn validate_email(email: &str) -> Result<(), BackendError> {
    let invalid = || BackendError::validation("Email address is not valid");
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(invalid());
    }
    Ok(())
}

/// Returns the trimmed name
pub fn validate_name(name: &str) -> Result<String, BackendError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BackendError::validation("Name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(BackendError::validation(format!(
            "Name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

pub fn validate_password(password: &str) -> Result<(), BackendError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(BackendError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@example.com").is_ok());
        assert!(validate_email("a.b@mail.example.org").is_ok());
        assert!(validate_email("example.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@localhost").is_err());
        assert!(validate_email("a@b@example.com").is_err());
        assert!(validate_email("a@example..com").is_err());
    }

    #[test]
    fn test_password_length_boundary() {
        assert!(validate_password("12345").is_err());
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Alice ").unwrap(), "Alice");
        assert!(validate_name("   ").is_err());
    }
}
