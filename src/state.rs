//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! by the auth extractors through `FromRef`. It holds the database pool, the
//! parsed config, the passport signer, the login-error limiter and the
//! conversation namer. Clone is required by Axum; every field is cheap to
//! clone.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::rate_limit::LoginErrorLimiter;
use crate::services::conversation::{ConversationNamer, ExcerptNamer};
use crate::services::passport::PassportSigner;
use crate::services::session::TokenTtl;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub passport: PassportSigner,
    /// Failed-login counters keyed by normalized email.
    pub login_limiter: LoginErrorLimiter,
    pub namer: Arc<dyn ConversationNamer>,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, config: Config) -> Self {
        let passport = PassportSigner::new(&config.secret_key);
        let login_limiter = LoginErrorLimiter::new(config.login_error_limit, config.login_error_window);
        Self {
            pool,
            config: Arc::new(config),
            passport,
            login_limiter,
            namer: Arc::new(ExcerptNamer::default()),
        }
    }

    #[must_use]
    pub fn token_ttl(&self) -> TokenTtl {
        TokenTtl {
            access_minutes: self.config.access_token_expire_minutes,
            refresh_days: self.config.refresh_token_expire_days,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
