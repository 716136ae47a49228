//! Console auth routes: login, logout, refresh-token, and the account extractor.

use axum::extract::{Extension, FromRef, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::logging::RequestId;
use crate::principal::Principal;
use crate::services::account::{self, AccountError};
use crate::services::session::{self, TokenPair};
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "access_token";

/// Token from an `Authorization: Bearer ...` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Caller address as reported by the fronting proxy.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    forwarded
        .or(real)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
}

fn access_cookie(value: String, secure: bool, max_age: Option<Duration>) -> Cookie<'static> {
    let mut cookie = Cookie::build((COOKIE_NAME, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build();
    if let Some(max_age) = max_age {
        cookie.set_max_age(max_age);
    }
    cookie
}

pub(crate) fn account_error(err: AccountError) -> ApiError {
    let status = match &err {
        AccountError::NotFound => StatusCode::BAD_REQUEST,
        AccountError::Banned => StatusCode::FORBIDDEN,
        AccountError::PasswordMismatch => StatusCode::UNAUTHORIZED,
        AccountError::Database(e) => return ApiError::internal(e),
    };
    ApiError::from_coded(status, &err)
}

/// `{"result": ..., "data": ...}` body used by the console auth endpoints.
#[derive(Debug, Serialize)]
pub struct ResultBody<T> {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ResultBody<T> {
    #[must_use]
    pub fn success(data: T) -> Self {
        Self { result: "success", data: Some(data) }
    }

    #[must_use]
    pub fn fail(data: T) -> Self {
        Self { result: "fail", data: Some(data) }
    }
}

impl ResultBody<()> {
    #[must_use]
    pub fn done() -> Self {
        Self { result: "success", data: None }
    }
}

fn refresh_rejected() -> Response {
    (StatusCode::UNAUTHORIZED, Json(ResultBody::fail("Invalid refresh token."))).into_response()
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Console account authenticated by bearer token or access cookie.
/// Use as a handler parameter to require a console login.
pub struct AuthAccount {
    pub account_id: Uuid,
    pub token: String,
}

impl AuthAccount {
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal::InternalUser { account_id: self.account_id }
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthAccount
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = bearer_token(&parts.headers)
            .or_else(|| jar.get(COOKIE_NAME).map(Cookie::value))
            .unwrap_or_default()
            .to_owned();
        if token.is_empty() {
            return Err(ApiError::unauthorized("Unauthorized."));
        }

        let app_state = AppState::from_ref(state);
        let account_id = session::validate_session(&app_state.pool, &token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired session."))?;

        Ok(Self { account_id, token })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// `POST /console/api/login`: password login for console accounts.
pub async fn login(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    Json(body): Json<LoginBody>,
) -> Result<(CookieJar, Json<ResultBody<TokenPair>>), ApiError> {
    let email = account::normalize_email(&body.email)
        .ok_or_else(|| ApiError::bad_request("invalid_email", "Invalid email address."))?;

    state
        .login_limiter
        .check(&email)
        .map_err(|e| ApiError::new(StatusCode::TOO_MANY_REQUESTS, "login_limit", e.to_string()))?;

    let account = match account::authenticate(&state.pool, &email, &body.password).await {
        Ok(account) => account,
        Err(err @ AccountError::PasswordMismatch) => {
            state.login_limiter.record_failure(&email);
            warn!(%request_id, "console login password mismatch");
            return Err(account_error(err));
        }
        Err(err) => return Err(account_error(err)),
    };

    if account::joined_tenant_count(&state.pool, account.id).await? == 0 {
        return Err(ApiError::bad_request("workspace_not_found", "Workspace not found."));
    }

    state.login_limiter.reset(&email);
    let ip = client_ip(&headers);
    account::record_login(&state.pool, account.id, ip.as_deref()).await?;
    let pair = session::create_token_pair(&state.pool, account.id, state.token_ttl(), ip.as_deref()).await?;

    let max_age = body
        .remember_me
        .then(|| Duration::minutes(state.config.access_token_expire_minutes));
    let jar = CookieJar::new().add(access_cookie(pair.access_token.clone(), state.config.cookie_secure, max_age));

    info!(%request_id, account_id = %account.id, "console login");
    Ok((jar, Json(ResultBody::success(pair))))
}

/// `POST /console/api/logout`: delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthAccount) -> Result<impl IntoResponse, ApiError> {
    session::delete_session(&state.pool, &auth.token).await?;

    let cookie = access_cookie(String::new(), state.config.cookie_secure, Some(Duration::ZERO));
    let jar = CookieJar::new().add(cookie);
    Ok((jar, Json(ResultBody::done())))
}

#[derive(Debug, Deserialize)]
pub struct RefreshBody {
    pub refresh_token: String,
}

/// `POST /console/api/refresh-token`: trade a refresh token for a new pair.
pub async fn refresh_token(State(state): State<AppState>, Json(body): Json<RefreshBody>) -> Response {
    match session::rotate_refresh_token(&state.pool, &body.refresh_token, state.token_ttl()).await {
        Ok(Some(pair)) => Json(ResultBody::success(pair)).into_response(),
        Ok(None) => refresh_rejected(),
        Err(e) => ApiError::internal(&e).into_response(),
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
