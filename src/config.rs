//! Configuration for Tally
//!
//! CLI arguments and environment variable handling using clap. All values are
//! read once at startup; nothing is hot-reloaded.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Tally - analytics ingestion and query gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "tally")]
#[command(about = "Analytics ingestion and query API")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://localhost:27017")]
    pub mongo_uri: String,

    /// MongoDB database name
    #[arg(long, env = "DB_NAME", default_value = "tally")]
    pub db_name: String,

    /// JWT secret for token signing (required)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Access token expiry in seconds
    #[arg(long, env = "JWT_ACCESS_EXPIRES", default_value = "1800")]
    pub jwt_access_expires_secs: u64,

    /// Refresh token expiry in seconds
    #[arg(long, env = "JWT_REFRESH_EXPIRES", default_value = "2592000")]
    pub jwt_refresh_expires_secs: u64,

    /// SMTP relay host (email disabled when unset)
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP relay port (implicit TLS)
    #[arg(long, env = "SMTP_PORT", default_value = "465")]
    pub smtp_port: u16,

    /// SMTP username
    #[arg(long, env = "SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    /// SMTP password
    #[arg(long, env = "SMTP_PASSWORD")]
    pub smtp_password: Option<String>,

    /// From address for outgoing mail
    #[arg(long, env = "SMTP_FROM")]
    pub smtp_from: Option<String>,

    /// API key for the OpenWeatherMap metric provider
    #[arg(long, env = "OPENWEATHER_API_KEY")]
    pub openweather_api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Outbound HTTP: total per-request timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_TOTAL", default_value = "10")]
    pub http_timeout_total_secs: u64,

    /// Outbound HTTP: connect timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_CONNECT", default_value = "3")]
    pub http_timeout_connect_secs: u64,

    /// Outbound HTTP: read timeout in seconds
    #[arg(long, env = "HTTP_TIMEOUT_READ", default_value = "5")]
    pub http_timeout_read_secs: u64,

    /// Outbound HTTP: connection pool size
    #[arg(long, env = "HTTP_MAX_CONNECTIONS", default_value = "100")]
    pub http_max_connections: usize,

    /// Outbound HTTP: DNS cache TTL in seconds
    #[arg(long, env = "HTTP_DNS_CACHE_TTL", default_value = "300")]
    pub http_dns_cache_ttl_secs: u64,

    /// Outbound HTTP: graceful shutdown timeout in seconds
    #[arg(long, env = "HTTP_SHUTDOWN_TIMEOUT", default_value = "5")]
    pub http_shutdown_timeout_secs: u64,

    /// Outbound HTTP: attempts per request (1 = no retry)
    #[arg(long, env = "HTTP_RETRIES", default_value = "3")]
    pub http_retries: u32,

    /// Outbound HTTP: exponential backoff base in seconds
    #[arg(long, env = "HTTP_RETRY_BACKOFF", default_value = "2.0")]
    pub http_retry_backoff: f64,

    /// Outbound HTTP: max concurrently admitted requests
    #[arg(long, env = "HTTP_MAX_IN_FLIGHT", default_value = "10")]
    pub http_max_in_flight: usize,
}

impl Args {
    /// Validate configuration invariants that clap cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.jwt_secret.as_deref().unwrap_or("").is_empty() {
            return Err("JWT_SECRET must be set".into());
        }
        if self.http_retries < 1 {
            return Err("HTTP_RETRIES must be at least 1".into());
        }
        if self.http_max_in_flight < 1 {
            return Err("HTTP_MAX_IN_FLIGHT must be at least 1".into());
        }
        if self.smtp_host.is_some() && self.smtp_from.is_none() {
            return Err("SMTP_FROM must be set when SMTP_HOST is configured".into());
        }
        Ok(())
    }
}
