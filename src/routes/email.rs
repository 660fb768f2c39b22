//! Email notification route

use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::routes::{error_response, json_response, parse_json_body, BoxBody};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub email: String,
    pub message: String,
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_subject() -> String {
    "Notification".to_string()
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub status: &'static str,
    pub message: &'static str,
}

/// POST /api/email/notification — queue an email for background delivery
pub async fn handle_notification(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: NotificationRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if body.email.is_empty() || body.message.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: email, message",
        );
    }

    let mailer = match state.mailer.clone() {
        Some(mailer) => mailer,
        None => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Email delivery is not configured",
            )
        }
    };

    tokio::spawn(async move {
        if let Err(e) = mailer.send(&body.email, &body.subject, &body.message).await {
            error!("Email delivery failed: {}", e);
        }
    });

    json_response(
        StatusCode::OK,
        &NotificationResponse {
            status: "queued",
            message: "Email notification queued successfully",
        },
    )
}
