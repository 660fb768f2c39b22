//! JWT token generation and validation
//!
//! HS256 tokens with `sub`/`type`/`iat`/`exp` claims. Access tokens guard the
//! API; refresh tokens only mint new access tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::types::{Result, TallyError};

/// Claims carried by every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's document ID
    pub sub: String,
    /// Token type: "access" or "refresh"
    #[serde(rename = "type")]
    pub token_type: String,
    /// Issued-at (unix seconds)
    pub iat: i64,
    /// Expiry (unix seconds)
    pub exp: i64,
}

/// Issues and validates HS256 tokens
#[derive(Clone)]
pub struct JwtValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtValidator {
    pub fn new(secret: &str, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_secs as i64),
            refresh_ttl: Duration::seconds(refresh_ttl_secs as i64),
        }
    }

    fn generate(&self, subject: &str, token_type: &str, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            token_type: token_type.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TallyError::Auth(format!("Failed to sign token: {}", e)))
    }

    /// Generate a short-lived access token
    pub fn generate_access(&self, subject: &str) -> Result<String> {
        self.generate(subject, "access", self.access_ttl)
    }

    /// Generate a long-lived refresh token
    pub fn generate_refresh(&self, subject: &str) -> Result<String> {
        self.generate(subject, "refresh", self.refresh_ttl)
    }

    /// Decode and verify signature + expiry
    pub fn decode(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| TallyError::Auth(format!("Invalid token: {}", e)))
    }

    /// Decode and require an access token
    pub fn validate_access(&self, token: &str) -> Result<Claims> {
        let claims = self.decode(token)?;
        if claims.token_type != "access" {
            return Err(TallyError::Auth("Access token required".into()));
        }
        Ok(claims)
    }
}

/// Extract a bearer token from an Authorization header value
pub fn extract_token_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> JwtValidator {
        JwtValidator::new("test-secret", 3600, 86400)
    }

    #[test]
    fn test_access_token_round_trip() {
        let v = validator();
        let token = v.generate_access("user-123").unwrap();
        let claims = v.validate_access(&token).unwrap();

        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.token_type, "access");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_refresh_token_rejected_for_access() {
        let v = validator();
        let token = v.generate_refresh("user-123").unwrap();
        assert!(v.validate_access(&token).is_err());
        // but it still decodes as a valid token
        let claims = v.decode(&token).unwrap();
        assert_eq!(claims.token_type, "refresh");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = validator().generate_access("user-123").unwrap();
        let other = JwtValidator::new("other-secret", 3600, 86400);
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let v = validator();
        let now = Utc::now();
        let claims = Claims {
            sub: "user-123".into(),
            token_type: "access".into(),
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(v.validate_access(&token).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_token_from_header("Bearer "), None);
        assert_eq!(extract_token_from_header("Basic abc123"), None);
    }
}
