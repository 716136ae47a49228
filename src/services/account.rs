//! Console account authentication.
//!
//! Passwords are stored as hex `sha256(salt || password)` with a per-account
//! random salt.

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::session::bytes_to_hex;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_PENDING: &str = "pending";
pub const STATUS_BANNED: &str = "banned";
pub const STATUS_CLOSED: &str = "closed";

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account not found")]
    NotFound,
    #[error("account is banned or closed")]
    Banned,
    #[error("email or password mismatch")]
    PasswordMismatch,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for AccountError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound => "account_not_found",
            Self::Banned => "account_banned",
            Self::PasswordMismatch => "email_or_password_mismatch",
            Self::Database(_) => "internal_server_error",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub password: Option<String>,
    pub password_salt: Option<String>,
    pub status: String,
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

/// Random 16-byte hex salt.
#[cfg(test)]
#[must_use]
pub fn generate_salt() -> String {
    use rand::Rng;

    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

#[must_use]
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Check a stored credential against a candidate password.
#[must_use]
pub fn verify_password(account: &AccountRow, password: &str) -> bool {
    match (&account.password, &account.password_salt) {
        (Some(stored), Some(salt)) => constant_time_eq(stored.as_bytes(), hash_password(password, salt).as_bytes()),
        _ => false,
    }
}

/// Look up an account by normalized email and check its password.
///
/// # Errors
///
/// Returns `NotFound`, `Banned`, `PasswordMismatch`, or a database error.
pub async fn authenticate(pool: &PgPool, email: &str, password: &str) -> Result<AccountRow, AccountError> {
    let account = sqlx::query_as::<_, AccountRow>(
        "SELECT id, password, password_salt, status FROM accounts WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?
    .ok_or(AccountError::NotFound)?;

    if account.status == STATUS_BANNED || account.status == STATUS_CLOSED {
        return Err(AccountError::Banned);
    }
    if !verify_password(&account, password) {
        return Err(AccountError::PasswordMismatch);
    }
    Ok(account)
}

/// Number of tenants the account belongs to.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn joined_tenant_count(pool: &PgPool, account_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tenant_account_joins WHERE account_id = $1")
        .bind(account_id)
        .fetch_one(pool)
        .await
}

/// Stamp the login and activate a pending account.
///
/// # Errors
///
/// Returns a database error if the update fails.
pub async fn record_login(pool: &PgPool, account_id: Uuid, ip: Option<&str>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"UPDATE accounts
          SET last_login_at = now(),
              last_login_ip = $2,
              status = CASE WHEN status = $3 THEN $4 ELSE status END
          WHERE id = $1",
    )
    .bind(account_id)
    .bind(ip)
    .bind(STATUS_PENDING)
    .bind(STATUS_ACTIVE)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;
