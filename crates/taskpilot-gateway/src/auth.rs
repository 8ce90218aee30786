use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use taskpilot_db::User;
use tracing::debug;

use crate::api::error_response;
use crate::state::SharedState;

#[derive(serde::Deserialize)]
pub struct CredentialsRequest {
    email: String,
    password: String,
}

/// POST /api/auth/register — create an account and return a bearer token.
pub async fn register(
    State(state): State<SharedState>,
    Json(body): Json<CredentialsRequest>,
) -> (StatusCode, Json<Value>) {
    let password_hash = match taskpilot_security::hash_password(&body.password) {
        Ok(hash) => hash,
        Err(e) => return error_response(e),
    };

    let user = {
        let users = state.users.lock().await;
        match users.create(&body.email, &password_hash) {
            Ok(user) => user,
            Err(e) => return error_response(e),
        }
    };

    let token = match state.tokens.issue(&user.id) {
        Ok(token) => token,
        Err(e) => return error_response(e),
    };

    (
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "user_id": user.id,
        })),
    )
}

/// POST /api/auth/login — verify credentials and return a bearer token.
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<CredentialsRequest>,
) -> (StatusCode, Json<Value>) {
    let user = {
        let users = state.users.lock().await;
        match users.find_by_email(&body.email) {
            Ok(Some(user)) => Some(user),
            Ok(None) => None,
            Err(e) => return error_response(e),
        }
    };

    // One rejection path for unknown email and wrong password.
    let authenticated = match &user {
        Some(user) => {
            taskpilot_security::verify_password(&body.password, &user.password_hash)
                .unwrap_or(false)
        }
        None => false,
    };

    if !authenticated {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "error",
                "message": "invalid email or password",
            })),
        );
    }

    let user = user.expect("authenticated implies user present");
    let token = match state.tokens.issue(&user.id) {
        Ok(token) => token,
        Err(e) => return error_response(e),
    };

    (
        StatusCode::OK,
        Json(json!({
            "token": token,
            "user_id": user.id,
        })),
    )
}

/// Resolve the authenticated user from the `Authorization: Bearer` header.
///
/// Verified subjects are served from the TTL cache; misses re-read the user
/// store so deleted accounts stop authenticating within one cache window.
pub async fn current_user(
    state: &SharedState,
    headers: &HeaderMap,
) -> Result<User, (StatusCode, Json<Value>)> {
    let unauthorized = |message: &str| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "error", "message": message})),
        )
    };

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| unauthorized("missing bearer token"))?;

    let user_id = state
        .tokens
        .verify(token)
        .map_err(|e| unauthorized(&e.to_string()))?;

    let cache_key = user_id.as_str().to_string();
    if let Some(user) = state.user_cache.get(&cache_key) {
        return Ok(user);
    }

    let user = {
        let users = state.users.lock().await;
        users
            .find_by_id(&user_id)
            .map_err(|_| unauthorized("authentication failed"))?
            .ok_or_else(|| unauthorized("unknown user"))?
    };

    debug!("user {} resolved from store, caching", user.id);
    state.user_cache.insert(cache_key, user.clone());
    Ok(user)
}
