//! Account procedures: me, register, login, logout.

use super::session::{clear_session_cookie, session_cookie};
use super::{ApiJson, AppState, MaybeUser, SuccessResponse, validate};
use crate::auth::{SessionClaims, hash_password, verify_password};
use crate::db::now_ms;
use crate::error::{ApiError, ApiResult};
use crate::types::{NewUser, PublicUser, Role};
use axum::{Json, extract::State, http::header, response::IntoResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub user: PublicUser,
    /// Same token as the cookie, for clients using `Authorization: Bearer`.
    pub token: String,
}

/// Current identity, or `null` when signed out or without a store.
pub async fn me(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> ApiResult<Json<Option<PublicUser>>> {
    let (Some(user), Some(db)) = (user, state.db()) else {
        return Ok(Json(None));
    };
    let found = db.get_user(user.id)?.map(PublicUser::from);
    Ok(Json(found))
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<Json<SuccessResponse>> {
    let limits = state.limits();
    let username = validate::username(&req.username, limits)?.to_string();
    let email = validate::email(&req.email)?.to_string();
    validate::password(&req.password, limits)?;

    let db = state.store()?;
    if db.get_user_by_username(&username)?.is_some() {
        return Err(ApiError::already_exists("Username").with_field("username"));
    }

    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(ApiError::internal)??;

    let role = match state.auth().admin_username.as_deref() {
        Some(admin) if admin == username => Role::Admin,
        _ => Role::User,
    };

    let user = db.create_user(NewUser {
        username,
        email: Some(email),
        password_hash,
        role,
    })?;
    info!(user_id = user.id, username = %user.username, role = user.role.as_str(), "Registered user");

    Ok(SuccessResponse::ok())
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.store()?;

    let Some(user) = db.get_user_by_username(&req.username)? else {
        warn!(username = %req.username, "Login for unknown user");
        return Err(ApiError::invalid_credentials());
    };

    let stored_hash = user.password_hash.clone().unwrap_or_default();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(ApiError::internal)?;
    if !valid {
        warn!(user_id = user.id, "Login with wrong password");
        return Err(ApiError::invalid_credentials());
    }

    db.touch_last_signed_in(user.id)?;

    let auth = state.auth();
    let ttl_ms = auth.session_ttl_ms();
    let token = state.signer().sign(&SessionClaims {
        user_id: user.id,
        username: user.username.clone(),
        expires_at: now_ms().saturating_add(ttl_ms),
    })?;
    let cookie = session_cookie(&auth.cookie_name, &token, ttl_ms, auth.secure_cookies);

    info!(user_id = user.id, "User signed in");

    let user = db
        .get_user(user.id)?
        .ok_or_else(|| ApiError::user_not_found(user.id))?;
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse {
            success: true,
            user: user.into(),
            token,
        }),
    ))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let auth = state.auth();
    let cookie = clear_session_cookie(&auth.cookie_name, auth.secure_cookies);
    ([(header::SET_COOKIE, cookie)], SuccessResponse::ok())
}
