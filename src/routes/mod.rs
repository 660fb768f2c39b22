//! HTTP route handlers
//!
//! Shared helpers for JSON responses, body/query parsing, and JWT guarding.
//! Routing itself lives in `server::http`.

pub mod analytics;
pub mod email;
pub mod health;
pub mod user;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{extract_token_from_header, Claims};
use crate::server::AppState;
use crate::types::TallyError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Standard error payload
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(json))
        .unwrap()
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response<BoxBody> {
    json_response(
        status,
        &ErrorResponse {
            error: message.into(),
        },
    )
}

/// Map a service error onto an HTTP status
pub fn service_error_response(err: &TallyError) -> Response<BoxBody> {
    let status = match err {
        TallyError::Http(_) => StatusCode::BAD_REQUEST,
        TallyError::Auth(_) => StatusCode::UNAUTHORIZED,
        TallyError::Upstream { .. } | TallyError::RequestFailed { .. } => StatusCode::BAD_GATEWAY,
        TallyError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn not_found(path: &str) -> Response<BoxBody> {
    error_response(StatusCode::NOT_FOUND, format!("Not found: {}", path))
}

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

/// Largest accepted request body (64 KiB)
const MAX_BODY_BYTES: usize = 65536;

/// Parse a JSON request body, rejecting while reading once the running
/// total passes the cap so oversized bodies are never fully buffered
pub async fn parse_json_body<T, B>(req: Request<B>) -> Result<T, TallyError>
where
    T: for<'de> Deserialize<'de>,
    B: hyper::body::Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let mut body = req.into_body();
    let mut buf = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| TallyError::Http(format!("Failed to read body: {}", e)))?;
        if let Ok(data) = frame.into_data() {
            if buf.len() + data.len() > MAX_BODY_BYTES {
                return Err(TallyError::Http("Request body too large".into()));
            }
            buf.extend_from_slice(&data);
        }
    }

    serde_json::from_slice(&buf).map_err(|e| TallyError::Http(format!("Invalid JSON: {}", e)))
}

/// Parse a query string into a typed struct
pub fn parse_query<T: for<'de> Deserialize<'de>>(query: Option<&str>) -> Result<T, TallyError> {
    serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| TallyError::Http(format!("Invalid query parameters: {}", e)))
}

/// Require a valid access token; on failure the caller returns the response
pub fn require_auth(
    req: &Request<hyper::body::Incoming>,
    state: &Arc<AppState>,
) -> Result<Claims, Response<BoxBody>> {
    let header = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "Authorization header missing or invalid",
            )
        })?;

    let token = extract_token_from_header(header).ok_or_else(|| {
        error_response(
            StatusCode::UNAUTHORIZED,
            "Authorization header missing or invalid",
        )
    })?;

    state
        .auth
        .validate_access(token)
        .map_err(|e| error_response(StatusCode::UNAUTHORIZED, e.to_string()))
}
