//! Analytics routes
//!
//! Event ingestion and aggregate queries. Ingestion endpoints return 202 and
//! insert in a background task. All routes require a JWT access token.

use bson::Document;
use chrono::{DateTime, Duration, Utc};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::db::schemas::{EventDoc, EventSource, MetricDoc};
use crate::routes::{
    error_response, json_response, parse_json_body, parse_query, require_auth,
    service_error_response, BoxBody,
};
use crate::server::AppState;
use crate::services::{EventQuery, GroupField, Interval};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct EventCreate {
    pub event_name: String,
    pub event_category: String,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub attributes: Document,
}

#[derive(Debug, Deserialize)]
pub struct MetricCreate {
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub tags: Document,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: String,
    pub event_name: String,
    pub event_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub source: EventSource,
    pub attributes: Document,
    pub created_at: Option<String>,
}

impl From<EventDoc> for EventResponse {
    fn from(event: EventDoc) -> Self {
        Self {
            id: event._id.map(|id| id.to_hex()).unwrap_or_default(),
            event_name: event.event_name,
            event_category: event.event_category,
            user_id: event.user_id,
            session_id: event.session_id,
            source: event.source,
            attributes: event.attributes,
            created_at: event
                .metadata
                .created_at
                .map(|dt| dt.to_chrono().to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListEventsParams {
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct GroupedParams {
    pub by: String,
}

#[derive(Debug, Deserialize)]
pub struct TimeseriesParams {
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_interval() -> String {
    "day".to_string()
}

fn default_days() -> i64 {
    7
}

#[derive(Debug, Deserialize)]
pub struct ActiveUsersParams {
    #[serde(default = "default_range")]
    pub range: String,
}

fn default_range() -> String {
    "day".to_string()
}

#[derive(Debug, Deserialize)]
pub struct WeatherParams {
    pub city: String,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /api/analytics/events — queue an event for background ingestion
pub async fn handle_create_event(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    let body: EventCreate = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if body.event_name.is_empty() || body.event_category.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: event_name, event_category",
        );
    }

    let event = EventDoc {
        event_name: body.event_name,
        event_category: body.event_category,
        user_id: body.user_id,
        session_id: body.session_id,
        source: body.source,
        attributes: body.attributes,
        ..Default::default()
    };

    let analytics = state.analytics.clone();
    tokio::spawn(async move {
        if let Err(e) = analytics.record_event(event).await {
            error!("Event ingestion failed: {}", e);
        }
    });

    json_response(
        StatusCode::ACCEPTED,
        &AcceptedResponse {
            status: "accepted",
            message: "Event queued for ingestion",
        },
    )
}

/// GET /api/analytics/events — list events with filters and pagination
pub async fn handle_list_events(
    req: Request<hyper::body::Incoming>,
    query: Option<&str>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    let params: ListEventsParams = match parse_query(query) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if params.page < 1 {
        return error_response(StatusCode::BAD_REQUEST, "page must be at least 1");
    }
    if !(1..=100).contains(&params.limit) {
        return error_response(StatusCode::BAD_REQUEST, "limit must be between 1 and 100");
    }

    let event_query = EventQuery {
        event_name: params.event_name,
        user_id: params.user_id,
        start_date: params.start_date,
        end_date: params.end_date,
        page: params.page,
        limit: params.limit,
    };

    match state.analytics.list_events(&event_query).await {
        Ok(events) => {
            let events: Vec<EventResponse> = events.into_iter().map(Into::into).collect();
            json_response(StatusCode::OK, &events)
        }
        Err(e) => service_error_response(&e),
    }
}

/// GET /api/analytics/events/{id}
pub async fn handle_get_event(
    req: Request<hyper::body::Incoming>,
    event_id: &str,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    match state.analytics.get_event(event_id).await {
        Ok(Some(event)) => json_response(StatusCode::OK, &EventResponse::from(event)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Event not found"),
        Err(e) => service_error_response(&e),
    }
}

/// GET /api/analytics/events/count — events in the last 24 hours
pub async fn handle_event_count(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    match state
        .analytics
        .count_events_since(Utc::now() - Duration::days(1))
        .await
    {
        Ok(count) => json_response(StatusCode::OK, &serde_json::json!({ "count": count })),
        Err(e) => service_error_response(&e),
    }
}

/// GET /api/analytics/events/daily — same window, legacy response shape
pub async fn handle_daily_events(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    match state
        .analytics
        .count_events_since(Utc::now() - Duration::days(1))
        .await
    {
        Ok(count) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "daily_events": count }),
        ),
        Err(e) => service_error_response(&e),
    }
}

/// GET /api/analytics/events/grouped?by=
pub async fn handle_grouped_events(
    req: Request<hyper::body::Incoming>,
    query: Option<&str>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    let params: GroupedParams = match parse_query(query) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let field: GroupField = match params.by.parse() {
        Ok(f) => f,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.analytics.events_grouped_by(field).await {
        Ok(groups) => json_response(StatusCode::OK, &groups),
        Err(e) => service_error_response(&e),
    }
}

/// GET /api/analytics/events/timeseries?interval=&days=
pub async fn handle_timeseries(
    req: Request<hyper::body::Incoming>,
    query: Option<&str>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    let params: TimeseriesParams = match parse_query(query) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let interval: Interval = match params.interval.parse() {
        Ok(i) => i,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    if !(1..=90).contains(&params.days) {
        return error_response(StatusCode::BAD_REQUEST, "days must be between 1 and 90");
    }

    let end = Utc::now();
    let start = end - Duration::days(params.days);

    match state.analytics.events_timeseries(interval, start, end).await {
        Ok(buckets) => json_response(StatusCode::OK, &buckets),
        Err(e) => service_error_response(&e),
    }
}

/// GET /api/analytics/users/active?range=day|week|month
pub async fn handle_active_users(
    req: Request<hyper::body::Incoming>,
    query: Option<&str>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    let params: ActiveUsersParams = match parse_query(query) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let window = match params.range.as_str() {
        "day" => Duration::days(1),
        "week" => Duration::days(7),
        "month" => Duration::days(30),
        other => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid range: {}", other),
            )
        }
    };

    match state.analytics.active_users(Utc::now() - window).await {
        Ok(count) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "range": params.range, "active_users": count }),
        ),
        Err(e) => service_error_response(&e),
    }
}

/// POST /api/analytics/metrics — queue a custom metric
pub async fn handle_create_metric(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    let body: MetricCreate = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if body.metric_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing required field: metric_name");
    }

    let metric = MetricDoc {
        metric_name: body.metric_name,
        value: body.value,
        unit: body.unit,
        tags: body.tags,
        source: "custom".to_string(),
        ..Default::default()
    };

    let analytics = state.analytics.clone();
    tokio::spawn(async move {
        if let Err(e) = analytics.record_metric(metric).await {
            error!("Metric ingestion failed: {}", e);
        }
    });

    json_response(
        StatusCode::ACCEPTED,
        &AcceptedResponse {
            status: "accepted",
            message: "Metric queued for ingestion",
        },
    )
}

/// GET /api/analytics/metrics/weather?city=
///
/// Fetches the current temperature from OpenWeatherMap through the shared
/// client and stores it as a metric.
pub async fn handle_weather_metric(
    req: Request<hyper::body::Incoming>,
    query: Option<&str>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    if let Err(response) = require_auth(&req, &state) {
        return response;
    }

    let params: WeatherParams = match parse_query(query) {
        Ok(p) => p,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let api_key = match &state.args.openweather_api_key {
        Some(key) => key.clone(),
        None => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "OpenWeatherMap API key is not configured",
            )
        }
    };

    let result = state
        .analytics
        .track_third_party_metric(
            "temperature",
            "https://api.openweathermap.org/data/2.5/weather",
            vec![
                ("q".to_string(), params.city),
                ("appid".to_string(), api_key),
                ("units".to_string(), "metric".to_string()),
            ],
            &["main", "temp"],
            "celsius",
            "openweathermap",
        )
        .await;

    match result {
        Ok(metric) => json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "success", "metric": metric }),
        ),
        Err(e) => {
            error!("Weather metric fetch failed: {}", e);
            service_error_response(&e)
        }
    }
}
