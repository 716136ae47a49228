//! App and site lookups shared by console access checks and passports.

use sqlx::PgPool;
use uuid::Uuid;

pub const STATUS_NORMAL: &str = "normal";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AppRow {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    pub enable_site: bool,
}

impl AppRow {
    /// Whether end users may reach the app through its web site.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == STATUS_NORMAL && self.enable_site
    }
}

/// Fetch an app by id.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_app(pool: &PgPool, app_id: Uuid) -> Result<Option<AppRow>, sqlx::Error> {
    sqlx::query_as::<_, AppRow>("SELECT id, tenant_id, status, enable_site FROM apps WHERE id = $1")
        .bind(app_id)
        .fetch_optional(pool)
        .await
}

/// Fetch an app the account can reach through tenant membership.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_app_for_account(pool: &PgPool, app_id: Uuid, account_id: Uuid) -> Result<Option<AppRow>, sqlx::Error> {
    sqlx::query_as::<_, AppRow>(
        r"SELECT a.id, a.tenant_id, a.status, a.enable_site
          FROM apps a
          JOIN tenant_account_joins j ON j.tenant_id = a.tenant_id
          WHERE a.id = $1 AND j.account_id = $2 AND a.status = $3",
    )
    .bind(app_id)
    .bind(account_id)
    .bind(STATUS_NORMAL)
    .fetch_optional(pool)
    .await
}

/// App id behind a site's public code, if the site is in normal status.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn find_active_site(pool: &PgPool, code: &str) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>("SELECT app_id FROM sites WHERE code = $1 AND status = $2")
        .bind(code)
        .bind(STATUS_NORMAL)
        .fetch_optional(pool)
        .await
}
