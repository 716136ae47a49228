//! Web-app passport issuance and the passport extractor.

use axum::extract::{FromRef, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::routes::auth::bearer_token;
use crate::services::passport::{self, PassportError, WebVisitor};
use crate::state::AppState;

pub const APP_CODE_HEADER: &str = "x-app-code";
pub const USER_ID_HEADER: &str = "x-user-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn passport_error(err: PassportError) -> ApiError {
    let status = match &err {
        PassportError::MissingAccount => StatusCode::BAD_REQUEST,
        PassportError::InvalidAccount
        | PassportError::MissingAppCode
        | PassportError::AppCodeMismatch
        | PassportError::InvalidToken(_)
        | PassportError::EndUserNotFound => StatusCode::UNAUTHORIZED,
        PassportError::SiteNotFound => StatusCode::NOT_FOUND,
        PassportError::Signing(_) | PassportError::Database(_) => return ApiError::internal(&err),
    };
    ApiError::from_coded(status, &err)
}

#[derive(Debug, Serialize)]
pub struct PassportResponse {
    pub access_token: String,
}

/// `GET /api/passport`: link the `X-User-Id` account to the app's end user
/// and return a signed passport.
pub async fn get_passport(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PassportResponse>, ApiError> {
    let raw_account = header_str(&headers, USER_ID_HEADER).ok_or_else(|| passport_error(PassportError::MissingAccount))?;
    let account_id = Uuid::parse_str(raw_account).map_err(|_| passport_error(PassportError::InvalidAccount))?;

    let access_token = passport::issue_passport(
        &state.pool,
        &state.passport,
        account_id,
        header_str(&headers, APP_CODE_HEADER),
    )
    .await
    .map_err(passport_error)?;

    Ok(Json(PassportResponse { access_token }))
}

// =============================================================================
// PASSPORT EXTRACTOR
// =============================================================================

/// End user authenticated by `Authorization: Bearer <passport>`.
pub struct WebAuth(pub WebVisitor);

impl<S> axum::extract::FromRequestParts<S> for WebAuth
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| ApiError::unauthorized("Missing passport."))?;
        let app_state = AppState::from_ref(state);
        let visitor = passport::authenticate_passport(
            &app_state.pool,
            &app_state.passport,
            token,
            header_str(&parts.headers, APP_CODE_HEADER),
        )
        .await
        .map_err(passport_error)?;
        Ok(Self(visitor))
    }
}
