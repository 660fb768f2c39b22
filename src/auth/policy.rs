//! Password strength policy
//!
//! Minimum 8 characters with at least one lowercase letter, one uppercase
//! letter, one digit, and one special character.

use crate::types::{Result, TallyError};

/// Accepted special characters
const SPECIAL_CHARS: &str = "@$!%*?&^#()_-+=";

/// Validate a candidate password against the policy
pub fn validate_password_strength(password: &str) -> Result<()> {
    let long_enough = password.chars().count() >= 8;
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| SPECIAL_CHARS.contains(c));

    if long_enough && has_lower && has_upper && has_digit && has_special {
        Ok(())
    } else {
        Err(TallyError::Auth(
            "Password must be at least 8 characters long and include \
             uppercase, lowercase, number, and special character"
                .into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_password() {
        assert!(validate_password_strength("Str0ng-pass").is_ok());
        assert!(validate_password_strength("Aa1@aaaa").is_ok());
    }

    #[test]
    fn test_too_short() {
        assert!(validate_password_strength("Aa1@a").is_err());
    }

    #[test]
    fn test_missing_classes() {
        assert!(validate_password_strength("alllowercase1@").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1@").is_err());
        assert!(validate_password_strength("NoDigitsHere@").is_err());
        assert!(validate_password_strength("NoSpecials123").is_err());
    }

    #[test]
    fn test_empty() {
        assert!(validate_password_strength("").is_err());
    }
}
