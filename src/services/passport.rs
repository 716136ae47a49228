//! Passport service: end-user linking and signed web-app tokens.
//!
//! ARCHITECTURE
//! ============
//! A console account opening a published web app is linked to an end user
//! whose id equals the account id. The passport is an HS256 JWT binding that
//! end user to the app; web routes verify it on every request and act as a
//! `Principal::ExternalVisitor`.
//!
//! TRADE-OFFS
//! ==========
//! Passports carry no expiry. Revocation happens by unpublishing the app or
//! deleting the end user, both of which are checked at verification time.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::principal::Principal;
use crate::services::app::{self, AppRow};

pub const PASSPORT_SUBJECT: &str = "Web API Passport";
pub const USER_TYPE_ACCOUNT_LINKED: &str = "account_linked";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PassportError {
    #[error("user account information is missing")]
    MissingAccount,
    #[error("invalid user account")]
    InvalidAccount,
    #[error("X-App-Code header is missing")]
    MissingAppCode,
    #[error("app code does not match passport")]
    AppCodeMismatch,
    #[error("site not found")]
    SiteNotFound,
    #[error("end user not found")]
    EndUserNotFound,
    #[error("invalid passport: {0}")]
    InvalidToken(jsonwebtoken::errors::Error),
    #[error("passport signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for PassportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingAccount => "missing_account",
            Self::InvalidAccount => "invalid_account",
            Self::MissingAppCode => "missing_app_code",
            Self::AppCodeMismatch => "app_code_mismatch",
            Self::SiteNotFound => "site_not_found",
            Self::EndUserNotFound => "end_user_not_found",
            Self::InvalidToken(_) => "invalid_passport",
            Self::Signing(_) | Self::Database(_) => "internal_server_error",
        }
    }
}

/// JWT claims of a web-app passport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportClaims {
    pub iss: String,
    pub sub: String,
    pub app_id: Uuid,
    pub app_code: String,
    pub end_user_id: Uuid,
    pub account_id: Uuid,
    pub user_type: String,
}

impl PassportClaims {
    #[must_use]
    pub fn new(app_id: Uuid, app_code: &str, end_user_id: Uuid, account_id: Uuid, user_type: &str) -> Self {
        Self {
            iss: app_id.to_string(),
            sub: PASSPORT_SUBJECT.to_owned(),
            app_id,
            app_code: app_code.to_owned(),
            end_user_id,
            account_id,
            user_type: user_type.to_owned(),
        }
    }
}

/// Passport holder resolved from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebVisitor {
    pub app_id: Uuid,
    pub end_user_id: Uuid,
}

impl WebVisitor {
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal::ExternalVisitor { end_user_id: self.end_user_id }
    }
}

// =============================================================================
// SIGNER
// =============================================================================

/// HS256 signer/verifier keyed by the service secret.
#[derive(Clone)]
pub struct PassportSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl PassportSigner {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign `claims` into a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns `Signing` if encoding fails.
    pub fn issue(&self, claims: &PassportClaims) -> Result<String, PassportError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(PassportError::Signing)
    }

    /// Verify a token's signature and decode its claims.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for malformed, tampered, or foreign tokens.
    pub fn verify(&self, token: &str) -> Result<PassportClaims, PassportError> {
        jsonwebtoken::decode::<PassportClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(PassportError::InvalidToken)
    }
}

// =============================================================================
// ISSUANCE
// =============================================================================

/// Link the account to an end user of the app behind `app_code` and sign a
/// passport for it.
///
/// # Errors
///
/// Returns `InvalidAccount` for an unknown account, `MissingAppCode` when no
/// code is given, `SiteNotFound` when the site or app is not published, or a
/// database/signing error.
pub async fn issue_passport(
    pool: &PgPool,
    signer: &PassportSigner,
    account_id: Uuid,
    app_code: Option<&str>,
) -> Result<String, PassportError> {
    let account_name = sqlx::query_scalar::<_, String>("SELECT name FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(pool)
        .await?
        .ok_or(PassportError::InvalidAccount)?;

    let app_code = app_code
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(PassportError::MissingAppCode)?;

    let site_app_id = app::find_active_site(pool, app_code)
        .await?
        .ok_or(PassportError::SiteNotFound)?;
    let app = app::find_app(pool, site_app_id)
        .await?
        .filter(AppRow::is_published)
        .ok_or(PassportError::SiteNotFound)?;

    let (end_user_id, user_type) = link_end_user(pool, &app, account_id, &account_name).await?;

    let claims = PassportClaims::new(app.id, app_code, end_user_id, account_id, &user_type);
    let token = signer.issue(&claims)?;

    info!(app_id = %app.id, %end_user_id, "passport issued");
    Ok(token)
}

/// Create or refresh the end user that shares the account's id.
async fn link_end_user(
    pool: &PgPool,
    app: &AppRow,
    account_id: Uuid,
    account_name: &str,
) -> Result<(Uuid, String), sqlx::Error> {
    sqlx::query_as::<_, (Uuid, String)>(
        r"INSERT INTO end_users (id, tenant_id, app_id, type, name, is_anonymous, session_id)
          VALUES ($1, $2, $3, $4, $5, FALSE, $6)
          ON CONFLICT (id) DO UPDATE
              SET type = EXCLUDED.type,
                  name = EXCLUDED.name,
                  is_anonymous = FALSE,
                  updated_at = now()
          RETURNING id, type",
    )
    .bind(account_id)
    .bind(app.tenant_id)
    .bind(app.id)
    .bind(USER_TYPE_ACCOUNT_LINKED)
    .bind(account_name)
    .bind(Uuid::new_v4().to_string())
    .fetch_one(pool)
    .await
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Resolve a bearer passport to its web visitor.
///
/// # Errors
///
/// Returns `InvalidToken` for a bad token, `AppCodeMismatch` when the request
/// names a different app, `SiteNotFound` when the app is no longer published
/// and `EndUserNotFound` when the end user was removed.
pub async fn authenticate_passport(
    pool: &PgPool,
    signer: &PassportSigner,
    token: &str,
    app_code: Option<&str>,
) -> Result<WebVisitor, PassportError> {
    let claims = signer.verify(token)?;
    check_app_code(&claims, app_code)?;

    app::find_app(pool, claims.app_id)
        .await?
        .filter(AppRow::is_published)
        .ok_or(PassportError::SiteNotFound)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM end_users WHERE id = $1)")
        .bind(claims.end_user_id)
        .fetch_one(pool)
        .await?;
    if !exists {
        return Err(PassportError::EndUserNotFound);
    }

    Ok(WebVisitor { app_id: claims.app_id, end_user_id: claims.end_user_id })
}

pub(crate) fn check_app_code(claims: &PassportClaims, app_code: Option<&str>) -> Result<(), PassportError> {
    match app_code.map(str::trim) {
        Some(code) if !code.is_empty() && code != claims.app_code => Err(PassportError::AppCodeMismatch),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "passport_test.rs"]
mod tests;
