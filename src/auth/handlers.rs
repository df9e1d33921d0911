use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::auth::session;
use crate::config::AuthConfig;
use crate::db::{self, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{cookie_value, ApiJson, CurrentUser};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

const MIN_PASSWORD_LEN: usize = 8;

// -- Cookie helpers --

pub fn session_cookie(config: &AuthConfig, token: &str) -> String {
    let max_age_secs = config.session_hours * 3600;
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        config.cookie_name, token, max_age_secs
    );
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(config: &AuthConfig) -> String {
    let mut cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", config.cookie_name);
    if config.secure_cookie {
        cookie.push_str("; Secure");
    }
    cookie
}

fn validate_username(username: &str) -> AppResult<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(AppError::BadRequest(
            "Username must be 3 to 32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(AppError::BadRequest(
            "Username may only contain letters, digits, '_', '.' and '-'".into(),
        ));
    }
    Ok(())
}

/// Respond with the user and a fresh session cookie.
fn signed_in(state: &AppState, user_id: &str, body: impl serde::Serialize) -> AppResult<Response> {
    let conn = state.db.get()?;
    let token = session::create_session(&conn, user_id, state.config.auth.session_hours)?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&state.config.auth, &token))],
        Json(body),
    )
        .into_response())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> AppResult<Response> {
    let username = req.username.trim().to_string();
    validate_username(&username)?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let cost = state.config.auth.bcrypt_cost;
    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {e}")))?;

    let user = {
        let conn = state.db.get()?;
        match users::create(&conn, &username, display_name.as_deref(), &hash) {
            Ok(user) => user,
            Err(e) if db::is_constraint_violation(&e) => {
                return Err(AppError::BadRequest("Username is already taken".into()));
            }
            Err(e) => return Err(e.into()),
        }
    };

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");
    let user_id = user.id.clone();
    signed_in(&state, &user_id, user)
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> AppResult<Response> {
    let found = {
        let conn = state.db.get()?;
        users::find_credentials(&conn, req.username.trim())?
    };

    // Accounts without a password hash cannot sign in with a password.
    let Some((user, Some(hash))) = found else {
        return Err(AppError::Unauthorized);
    };

    let password = req.password;
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {e}")))?
        .unwrap_or(false);

    if !verified {
        tracing::warn!(username = %user.username, "Failed login attempt");
        return Err(AppError::Unauthorized);
    }

    let user_id = user.id.clone();
    signed_in(&state, &user_id, user)
}

/// POST /api/auth/logout: delete the session, if any, and clear the cookie
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = cookie_value(&headers, &state.config.auth.cookie_name) {
        let conn = state.db.get()?;
        session::delete_session(&conn, token)?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie(&state.config.auth))],
    )
        .into_response())
}

/// GET /api/auth/me
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let summary = users::get(&conn, &user.id)?.ok_or(AppError::Unauthorized)?;
    Ok(Json(summary).into_response())
}
