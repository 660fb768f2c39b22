//! User signup, login, and profile routes

use bson::{doc, oid::ObjectId};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{hash_password, validate_password_strength, verify_password};
use crate::db::schemas::UserDoc;
use crate::routes::{
    error_response, json_response, parse_json_body, require_auth, BoxBody,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub id: String,
    pub email: String,
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub is_active: bool,
    pub created_at: Option<String>,
}

/// POST /api/user/signup
///
/// Validates the password policy, rejects duplicate emails, hashes with
/// Argon2, inserts the user, and queues a welcome email.
pub async fn handle_signup(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: SignupRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    if body.email.is_empty() || body.username.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: username, email",
        );
    }

    if let Err(e) = validate_password_strength(&body.password) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    match state.users.find_one(doc! { "email": &body.email }).await {
        Ok(Some(_)) => {
            warn!(email = %body.email, "Signup attempt with existing email");
            return error_response(
                StatusCode::CONFLICT,
                "User with this email already exists",
            );
        }
        Ok(None) => {}
        Err(e) => {
            error!("User lookup failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user");
        }
    }

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => {
            error!("Password hashing failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user");
        }
    };

    let user = UserDoc::new(
        body.email.clone(),
        body.username.clone(),
        password_hash,
        body.is_active,
    );

    let user_id = match state.users.insert_one(user).await {
        Ok(id) => id,
        Err(e) => {
            error!("Error inserting user: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to register user");
        }
    };

    info!(user_id = %user_id.to_hex(), "User created");

    // Welcome email runs in the background; delivery failure never blocks
    // the signup response.
    if let Some(mailer) = state.mailer.clone() {
        let email = body.email.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer
                .send(&email, "Notification", "User has been created successfully")
                .await
            {
                error!("Welcome email failed: {}", e);
            }
        });
    }

    json_response(
        StatusCode::CREATED,
        &SignupResponse {
            id: user_id.to_hex(),
            email: body.email,
            message: "User registered successfully",
        },
    )
}

/// POST /api/user/login
pub async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let user = match state.users.find_one(doc! { "username": &body.username }).await {
        Ok(Some(user)) => user,
        Ok(None) => return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(e) => {
            error!("User lookup failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    match verify_password(&body.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return error_response(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        Err(e) => {
            error!("Password verification failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    }

    let subject = match user._id {
        Some(id) => id.to_hex(),
        None => {
            error!("User document missing _id");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed");
        }
    };

    let tokens = state
        .auth
        .generate_access(&subject)
        .and_then(|access_token| {
            state
                .auth
                .generate_refresh(&subject)
                .map(|refresh_token| TokenResponse {
                    access_token,
                    refresh_token,
                })
        });

    match tokens {
        Ok(tokens) => json_response(StatusCode::OK, &tokens),
        Err(e) => {
            error!("Token generation failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Login failed")
        }
    }
}

/// GET /api/user/profile
pub async fn handle_profile(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match require_auth(&req, &state) {
        Ok(claims) => claims,
        Err(response) => return response,
    };

    let oid = match ObjectId::parse_str(&claims.sub) {
        Ok(oid) => oid,
        Err(_) => return error_response(StatusCode::UNAUTHORIZED, "Invalid token subject"),
    };

    match state.users.find_one(doc! { "_id": oid }).await {
        Ok(Some(user)) => json_response(
            StatusCode::OK,
            &ProfileResponse {
                id: user._id.map(|id| id.to_hex()).unwrap_or_default(),
                email: user.email,
                username: user.username,
                is_active: user.is_active,
                created_at: user
                    .metadata
                    .created_at
                    .map(|dt| dt.to_chrono().to_rfc3339()),
            },
        ),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "User not found"),
        Err(e) => {
            error!("Profile lookup failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Profile lookup failed")
        }
    }
}
