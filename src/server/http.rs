//! HTTP server implementation
//!
//! hyper http1 with TokioIo, one spawned task per connection, manual
//! `(method, path)` routing.

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::auth::JwtValidator;
use crate::client::HttpClientManager;
use crate::config::Args;
use crate::db::schemas::{UserDoc, USER_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::routes::{self, BoxBody};
use crate::services::{AnalyticsService, Mailer};
use crate::types::{Result, TallyError};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub auth: JwtValidator,
    pub users: MongoCollection<UserDoc>,
    pub analytics: AnalyticsService,
    pub mailer: Option<Mailer>,
    /// Shared outbound client for third-party metric providers
    pub http: Arc<HttpClientManager>,
    pub started_at: Instant,
}

impl AppState {
    /// Wire up collections and services against a connected MongoDB
    pub async fn new(
        args: Args,
        mongo: &MongoClient,
        http: Arc<HttpClientManager>,
        mailer: Option<Mailer>,
    ) -> Result<Self> {
        let secret = args
            .jwt_secret
            .as_deref()
            .ok_or_else(|| TallyError::Config("JWT_SECRET must be set".into()))?;

        let auth = JwtValidator::new(
            secret,
            args.jwt_access_expires_secs,
            args.jwt_refresh_expires_secs,
        );

        let users = mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        let analytics = AnalyticsService::new(mongo, Arc::clone(&http)).await?;

        Ok(Self {
            args,
            auth,
            users,
            analytics,
            mailer,
            http,
            started_at: Instant::now(),
        })
    }
}

/// Accept loop. Runs until the process is stopped.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen)
        .await
        .map_err(|e| TallyError::Internal(format!("Failed to bind {}: {}", state.args.listen, e)))?;

    info!("Listening on {}", state.args.listen);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!("Connection from {}", peer);
                let state = Arc::clone(&state);

                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(req, state).await }
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Connection error from {}: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                error!("Accept failed: {}", e);
            }
        }
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> std::result::Result<Response<BoxBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let query = query.as_deref();

    if method == Method::OPTIONS {
        return Ok(routes::cors_preflight());
    }

    let response = match (method, path.as_str()) {
        (Method::GET, "/health" | "/healthz") => routes::health::handle_health(state).await,

        (Method::POST, "/api/user/signup") => routes::user::handle_signup(req, state).await,
        (Method::POST, "/api/user/login") => routes::user::handle_login(req, state).await,
        (Method::GET, "/api/user/profile") => routes::user::handle_profile(req, state).await,

        (Method::POST, "/api/analytics/events") => {
            routes::analytics::handle_create_event(req, state).await
        }
        (Method::GET, "/api/analytics/events") => {
            routes::analytics::handle_list_events(req, query, state).await
        }
        (Method::GET, "/api/analytics/events/count") => {
            routes::analytics::handle_event_count(req, state).await
        }
        (Method::GET, "/api/analytics/events/daily") => {
            routes::analytics::handle_daily_events(req, state).await
        }
        (Method::GET, "/api/analytics/events/grouped") => {
            routes::analytics::handle_grouped_events(req, query, state).await
        }
        (Method::GET, "/api/analytics/events/timeseries") => {
            routes::analytics::handle_timeseries(req, query, state).await
        }
        (Method::GET, "/api/analytics/users/active") => {
            routes::analytics::handle_active_users(req, query, state).await
        }
        (Method::POST, "/api/analytics/metrics") => {
            routes::analytics::handle_create_metric(req, state).await
        }
        (Method::GET, "/api/analytics/metrics/weather") => {
            routes::analytics::handle_weather_metric(req, query, state).await
        }
        // Keep last so the fixed /events/* routes above win
        (Method::GET, p) if p.starts_with("/api/analytics/events/") => {
            let event_id = p.trim_start_matches("/api/analytics/events/").to_string();
            routes::analytics::handle_get_event(req, &event_id, state).await
        }

        (Method::POST, "/api/email/notification") => {
            routes::email::handle_notification(req, state).await
        }

        _ => routes::not_found(&path),
    };

    Ok(response)
}
