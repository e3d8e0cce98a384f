//! Session extraction and cookie formatting.

use super::AppState;
use crate::db::now_ms;
use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, header, request::Parts};
use std::convert::Infallible;
use tracing::debug;

/// The authenticated caller. Rejects the request with `UNAUTHORIZED` when
/// no valid session token is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

/// The caller if authenticated; never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<CurrentUser>);

/// Candidate tokens in precedence order: `Authorization: Bearer`, then the
/// session cookie.
fn session_tokens(headers: &HeaderMap, cookie_name: &str) -> Vec<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string());

    let cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.to_string());

    bearer
        .into_iter()
        .chain(cookie)
        .filter(|token| !token.is_empty())
        .collect()
}

/// First candidate token that verifies. A rejected bearer token falls back
/// to the cookie.
fn authenticate(parts: &Parts, state: &AppState) -> Option<CurrentUser> {
    let now = now_ms();
    session_tokens(&parts.headers, &state.auth().cookie_name)
        .into_iter()
        .find_map(|token| match state.signer().verify(&token, now) {
            Ok(claims) => Some(CurrentUser {
                id: claims.user_id,
                username: claims.username,
            }),
            Err(e) => {
                debug!(error = %e, "Rejected session token");
                None
            }
        })
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).ok_or_else(ApiError::unauthorized)
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(authenticate(parts, state)))
    }
}

fn cookie_attributes(secure: bool) -> &'static str {
    if secure {
        "Path=/; HttpOnly; SameSite=None; Secure"
    } else {
        "Path=/; HttpOnly; SameSite=Lax"
    }
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(name: &str, token: &str, max_age_ms: i64, secure: bool) -> String {
    format!(
        "{}={}; {}; Max-Age={}",
        name,
        token,
        cookie_attributes(secure),
        max_age_ms / 1000
    )
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(name: &str, secure: bool) -> String {
    format!("{}=; {}; Max-Age=0", name, cookie_attributes(secure))
}
