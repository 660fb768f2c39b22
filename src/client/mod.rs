//! Outbound HTTP client for third-party metric providers
//!
//! One shared, pooled, concurrency-bounded reqwest client for all outbound
//! calls, with automatic retry on transport failure. HTTP error statuses are
//! returned to callers untouched; only transport-level failures (connect,
//! timeout, DNS) are retried.

pub mod manager;

pub use manager::{
    headers_from_pairs, ClientConfig, ClientHealth, HttpClientManager, RequestOptions,
};
