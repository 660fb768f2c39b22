//! Shared HTTP client manager
//!
//! Owns at most one live pooled client at a time. `initialize()` and
//! `shutdown()` are idempotent and serialized against each other by a mutex;
//! `request()` calls already past admission are not serialized against
//! `shutdown()` and may fail if the pool is torn down underneath them.
//!
//! Admission control (the semaphore) is independent of the connection pool:
//! a caller can wait on a permit while the pool has idle connections, and
//! vice versa.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::Args;
use crate::types::{Result, TallyError};

/// Immutable client configuration, read once at startup
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Total per-request timeout (connect + write + read)
    pub timeout_total: Duration,
    /// Connect timeout
    pub timeout_connect: Duration,
    /// Read timeout between response body chunks
    pub timeout_read: Duration,
    /// Idle connections kept per host
    pub max_connections: usize,
    /// DNS cache TTL; idle pooled connections are also dropped after this
    /// long so reconnects re-resolve
    pub dns_cache_ttl: Duration,
    /// Headers applied to every request unless overridden by the caller
    pub default_headers: HeaderMap,
    /// Bound on graceful shutdown
    pub shutdown_timeout: Duration,
    /// Attempts per request; 1 means a single attempt, no retry
    pub retries: u32,
    /// Exponential backoff base in seconds (sleep = base^attempt)
    pub backoff_base: f64,
    /// Max concurrently admitted requests, independent of the pool size
    pub max_in_flight: usize,
}

impl ClientConfig {
    /// Build the client configuration from CLI args
    pub fn from_args(args: &Args) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        default_headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(concat!("tally/", env!("CARGO_PKG_VERSION"))),
        );

        Self {
            timeout_total: Duration::from_secs(args.http_timeout_total_secs),
            timeout_connect: Duration::from_secs(args.http_timeout_connect_secs),
            timeout_read: Duration::from_secs(args.http_timeout_read_secs),
            max_connections: args.http_max_connections,
            dns_cache_ttl: Duration::from_secs(args.http_dns_cache_ttl_secs),
            default_headers,
            shutdown_timeout: Duration::from_secs(args.http_shutdown_timeout_secs),
            retries: args.http_retries,
            backoff_base: args.http_retry_backoff,
            max_in_flight: args.http_max_in_flight,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        default_headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(concat!("tally/", env!("CARGO_PKG_VERSION"))),
        );

        Self {
            timeout_total: Duration::from_secs(10),
            timeout_connect: Duration::from_secs(3),
            timeout_read: Duration::from_secs(5),
            max_connections: 100,
            dns_cache_ttl: Duration::from_secs(300),
            default_headers,
            shutdown_timeout: Duration::from_secs(5),
            retries: 3,
            backoff_base: 2.0,
            max_in_flight: 10,
        }
    }
}

/// Per-call options for [`HttpClientManager::request`]
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Caller headers, merged over the defaults (caller wins on collision)
    pub headers: Option<HeaderMap>,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// JSON request body
    pub body: Option<serde_json::Value>,
    /// Attempt count override
    pub retries: Option<u32>,
    /// Backoff base override
    pub backoff_base: Option<f64>,
}

/// The live pooled client plus its creation timestamp
struct ClientHandle {
    client: reqwest::Client,
    created_at: DateTime<Utc>,
}

/// Health snapshot reported by the manager
#[derive(Debug, Clone, Serialize)]
pub struct ClientHealth {
    /// Whether a live client exists
    pub active: bool,
    /// When the current client was created
    pub created_at: Option<DateTime<Utc>>,
}

/// Owner of the single shared outbound client
///
/// Constructed once at startup and injected into [`crate::AppState`]; tests
/// construct isolated instances.
pub struct HttpClientManager {
    config: ClientConfig,
    handle: Mutex<Option<ClientHandle>>,
    semaphore: Arc<Semaphore>,
}

impl HttpClientManager {
    /// Create a manager; no client exists until [`initialize`](Self::initialize)
    pub fn new(config: ClientConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_in_flight));
        Self {
            config,
            handle: Mutex::new(None),
            semaphore,
        }
    }

    /// Create the pooled client. Idempotent: a second call while a client is
    /// live returns without touching it.
    pub async fn initialize(&self) -> Result<()> {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            debug!("HTTP client already initialized");
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .timeout(self.config.timeout_total)
            .connect_timeout(self.config.timeout_connect)
            .read_timeout(self.config.timeout_read)
            .pool_max_idle_per_host(self.config.max_connections)
            // Idle connections never outlive the DNS TTL, so a reconnect
            // always re-resolves through the caching resolver.
            .pool_idle_timeout(self.config.dns_cache_ttl)
            .hickory_dns(true)
            .build()
            .map_err(|e| TallyError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let created_at = Utc::now();
        *guard = Some(ClientHandle { client, created_at });

        info!(
            max_connections = self.config.max_connections,
            timeout_secs = self.config.timeout_total.as_secs(),
            max_in_flight = self.config.max_in_flight,
            "HTTP client created"
        );

        Ok(())
    }

    /// Close the pooled client, waiting up to the shutdown timeout for
    /// in-flight requests to drain. Idempotent.
    ///
    /// Returns `true` when the close was clean (drained, or nothing to
    /// close) and `false` when the drain timed out. A timeout is logged and
    /// absorbed; the client reference is discarded either way, so shutdown
    /// never hangs the process.
    pub async fn shutdown(&self) -> bool {
        let mut guard = self.handle.lock().await;
        if guard.is_none() {
            debug!("HTTP client already closed");
            return true;
        }

        info!("Closing HTTP client");

        // Holding every admission permit means no request is in flight.
        let drained = tokio::time::timeout(
            self.config.shutdown_timeout,
            self.semaphore.acquire_many(self.config.max_in_flight as u32),
        )
        .await;

        // Dropping the handle drops the last reqwest::Client reference held
        // by the manager; pooled connections close as they are released.
        *guard = None;

        match drained {
            Ok(Ok(_permits)) => {
                info!("HTTP client closed");
                true
            }
            Ok(Err(_)) => {
                warn!("HTTP client semaphore closed during shutdown");
                false
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.shutdown_timeout.as_secs(),
                    "Timeout waiting for in-flight requests; discarding HTTP client"
                );
                false
            }
        }
    }

    /// Snapshot for the health endpoint
    pub async fn health(&self) -> ClientHealth {
        let guard = self.handle.lock().await;
        ClientHealth {
            active: guard.is_some(),
            created_at: guard.as_ref().map(|h| h.created_at),
        }
    }

    /// Issue a request through the shared pool.
    ///
    /// Transport failures (connect refused, timeout, DNS) are retried up to
    /// the configured attempt count with exponential backoff; an HTTP error
    /// status is a completed request and is returned for the caller to
    /// interpret.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        opts: RequestOptions,
    ) -> Result<reqwest::Response> {
        let client = {
            let guard = self.handle.lock().await;
            guard
                .as_ref()
                .map(|h| h.client.clone())
                .ok_or(TallyError::NotInitialized)?
        };

        let headers = merge_headers(&self.config.default_headers, opts.headers.as_ref());
        let retries = opts.retries.unwrap_or(self.config.retries).max(1);
        let backoff_base = opts.backoff_base.unwrap_or(self.config.backoff_base);

        // Admission control: at most max_in_flight requests past this point.
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TallyError::Internal("Admission semaphore closed".into()))?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let mut builder = client
                .request(method.clone(), url)
                .headers(headers.clone());
            if !opts.query.is_empty() {
                builder = builder.query(&opts.query);
            }
            if let Some(body) = &opts.body {
                builder = builder.json(body);
            }

            let start = Instant::now();
            match builder.send().await {
                Ok(response) => {
                    info!(
                        method = %method,
                        url = %url,
                        status = response.status().as_u16(),
                        attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "HTTP request completed"
                    );
                    return Ok(response);
                }
                Err(err) => {
                    warn!(
                        method = %method,
                        url = %url,
                        attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        error = %err,
                        "HTTP request failed"
                    );

                    if attempt >= retries {
                        return Err(TallyError::RequestFailed {
                            url: url.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }

                    // No cap, no jitter: sleep grows as base^attempt.
                    let delay = Duration::from_secs_f64(backoff_base.powi(attempt as i32));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Merge caller headers over the defaults; caller values win on collision
fn merge_headers(defaults: &HeaderMap, caller: Option<&HeaderMap>) -> HeaderMap {
    let mut merged = defaults.clone();
    if let Some(extra) = caller {
        for (name, value) in extra {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Build a header map from string pairs; invalid names/values are skipped
pub fn headers_from_pairs(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        }
    }
    map
}
