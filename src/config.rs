//! Service configuration parsed from environment variables.
//!
//! `main` loads `.env` through `dotenvy` first, so every key below may also
//! come from that file.

use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 60;
pub const DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS: i64 = 30;
pub const DEFAULT_LOGIN_ERROR_LIMIT: usize = 5;
pub const DEFAULT_LOGIN_ERROR_WINDOW_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} required")]
    Missing(&'static str),
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// HS256 key for passports.
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub login_error_limit: usize,
    pub login_error_window: Duration,
    pub log_level: tracing::Level,
    pub cookie_secure: bool,
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `DATABASE_URL`
    /// - `SECRET_KEY`
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `DB_MAX_CONNECTIONS`: default 5
    /// - `ACCESS_TOKEN_EXPIRE_MINUTES`: default 60
    /// - `REFRESH_TOKEN_EXPIRE_DAYS`: default 30
    /// - `LOGIN_ERROR_LIMIT`: default 5
    /// - `LOGIN_ERROR_WINDOW_SECS`: default 86400
    /// - `LOG_LEVEL`: default `info`
    /// - `COOKIE_SECURE`: default false
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let secret_key = required("SECRET_KEY")?;

        Ok(Self {
            database_url,
            port: env_parse("PORT", DEFAULT_PORT)?,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            secret_key,
            access_token_expire_minutes: env_parse("ACCESS_TOKEN_EXPIRE_MINUTES", DEFAULT_ACCESS_TOKEN_EXPIRE_MINUTES)?,
            refresh_token_expire_days: env_parse("REFRESH_TOKEN_EXPIRE_DAYS", DEFAULT_REFRESH_TOKEN_EXPIRE_DAYS)?,
            login_error_limit: env_parse("LOGIN_ERROR_LIMIT", DEFAULT_LOGIN_ERROR_LIMIT)?,
            login_error_window: Duration::from_secs(env_parse(
                "LOGIN_ERROR_WINDOW_SECS",
                DEFAULT_LOGIN_ERROR_WINDOW_SECS,
            )?),
            log_level: env_parse("LOG_LEVEL", tracing::Level::INFO)?,
            cookie_secure: match std::env::var("COOKIE_SECURE") {
                Ok(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { key: "COOKIE_SECURE", value: raw })?,
                Err(_) => false,
            },
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
