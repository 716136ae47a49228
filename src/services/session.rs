//! Console session and refresh-token management.
//!
//! ARCHITECTURE
//! ============
//! A login issues a pair: a short-lived access token stored in `sessions` and
//! a long-lived refresh token stored in `refresh_tokens`. The access token
//! authenticates console requests; the refresh token buys a new pair.
//!
//! TRADE-OFFS
//! ==========
//! Refresh consumption is destructive (`DELETE ... RETURNING`) so each
//! refresh token works once; a replayed token fails even inside its TTL.

use std::fmt::Write;

use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Lifetimes of newly issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenTtl {
    pub access_minutes: i64,
    pub refresh_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issue a new access/refresh pair for the account.
///
/// # Errors
///
/// Returns a database error if either insert fails; nothing is stored then.
pub async fn create_token_pair(pool: &PgPool, account_id: Uuid, ttl: TokenTtl, ip: Option<&str>) -> Result<TokenPair, sqlx::Error> {
    let pair = TokenPair { access_token: generate_token(), refresh_token: generate_token() };

    let mut tx = pool.begin().await?;
    sqlx::query(
        "INSERT INTO sessions (token, account_id, ip, expires_at)
         VALUES ($1, $2, $3, now() + make_interval(mins => $4::int))",
    )
    .bind(&pair.access_token)
    .bind(account_id)
    .bind(ip)
    .bind(ttl.access_minutes)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "INSERT INTO refresh_tokens (token, account_id, expires_at)
         VALUES ($1, $2, now() + make_interval(days => $3::int))",
    )
    .bind(&pair.refresh_token)
    .bind(account_id)
    .bind(ttl.refresh_days)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(pair)
}

/// Validate an access token and return its account id. Expired sessions
/// and accounts that are no longer active yield `None`.
pub async fn validate_session(pool: &PgPool, token: &str) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r"SELECT a.id
          FROM sessions s
          JOIN accounts a ON a.id = s.account_id
          WHERE s.token = $1 AND s.expires_at > now() AND a.status = 'active'",
    )
    .bind(token)
    .fetch_optional(pool)
    .await
}

/// Delete a session by access token.
pub async fn delete_session(pool: &PgPool, token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sessions WHERE token = $1")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Consume a refresh token and issue a fresh pair, or `None` if the token
/// is unknown, expired, or already used.
pub async fn rotate_refresh_token(pool: &PgPool, refresh_token: &str, ttl: TokenTtl) -> Result<Option<TokenPair>, sqlx::Error> {
    let account_id = sqlx::query_scalar::<_, Uuid>(
        "DELETE FROM refresh_tokens WHERE token = $1 AND expires_at > now() RETURNING account_id",
    )
    .bind(refresh_token)
    .fetch_optional(pool)
    .await?;

    match account_id {
        Some(account_id) => Ok(Some(create_token_pair(pool, account_id, ttl, None).await?)),
        None => Ok(None),
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
