//! Tally - analytics ingestion and query gateway
//!
//! A small HTTP service that ingests analytics events and custom metrics into
//! MongoDB, answers aggregate queries over them, and pulls metrics from
//! third-party providers through a shared, retrying HTTP client.
//!
//! ## Pieces
//!
//! - **Client**: pooled outbound HTTP client with admission control and
//!   retry-with-backoff for third-party metric fetches
//! - **Analytics**: event/metric ingestion and aggregation queries
//! - **Auth**: signup/login with Argon2 hashing and JWT tokens
//! - **Email**: SMTP notification delivery

pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, TallyError};
