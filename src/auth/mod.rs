//! Authentication for Tally
//!
//! Provides:
//! - JWT access/refresh token generation and validation
//! - Password hashing with Argon2
//! - Password strength policy

pub mod jwt;
pub mod password;
pub mod policy;

pub use jwt::{extract_token_from_header, Claims, JwtValidator};
pub use password::{hash_password, verify_password};
pub use policy::validate_password_strength;
