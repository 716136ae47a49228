//! Conversation service: paginated listing, lookup, rename, soft delete.
//!
//! DESIGN
//! ======
//! Every query is narrowed by a [`ConversationScope`]: the app, the owning
//! principal's columns and the soft-delete flag. Listing adds the
//! `invoke_from` channel and runs through the generic cursor paginator with
//! [`PgConversationSource`] as its record source.
//!
//! ERROR HANDLING
//! ==============
//! A cursor that no longer resolves inside the scope surfaces as
//! [`ConversationError::LastConversationNotFound`] so clients can restart
//! from the first page. A failing namer never fails `auto_generate_name`;
//! the conversation keeps its current name.

use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::pagination::{
    self, Boundary, FieldOf, IdFilter, KeyOf, Keyed, Page, PageQuery, PageRequest, PaginationError, RecordSource,
};
use crate::principal::{InvokeFrom, Principal};

pub const DEFAULT_SORT: &str = "-updated_at";

const COLUMNS: &str =
    "id, app_id, name, from_source, from_end_user_id, from_account_id, invoke_from, is_deleted, created_at, updated_at";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Last conversation not exists.")]
    LastConversationNotFound(Uuid),
    #[error("Conversation not exists.")]
    NotFound(Uuid),
    #[error("Message not exists.")]
    MessageNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for ConversationError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LastConversationNotFound(_) => "last_conversation_not_exists",
            Self::NotFound(_) => "conversation_not_exists",
            Self::MessageNotFound(_) => "message_not_exists",
            Self::Database(_) => "internal_server_error",
        }
    }
}

impl From<PaginationError> for ConversationError {
    fn from(err: PaginationError) -> Self {
        match err {
            PaginationError::ReferenceNotFound(id) => Self::LastConversationNotFound(id),
            PaginationError::Database(e) => Self::Database(e),
        }
    }
}

/// Row of the `conversations` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub app_id: Uuid,
    pub name: String,
    pub from_source: String,
    pub from_end_user_id: Option<Uuid>,
    pub from_account_id: Option<Uuid>,
    pub invoke_from: Option<String>,
    #[serde(skip)]
    pub is_deleted: bool,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationSortField {
    CreatedAt,
    UpdatedAt,
}

impl ConversationSortField {
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported sort field: {0}")]
pub struct UnknownSortField(pub String);

impl FromStr for ConversationSortField {
    type Err = UnknownSortField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            other => Err(UnknownSortField(other.to_owned())),
        }
    }
}

impl Keyed for Conversation {
    type Field = ConversationSortField;
    type Key = OffsetDateTime;

    fn id(&self) -> Uuid {
        self.id
    }

    fn sort_key(&self, field: ConversationSortField) -> OffsetDateTime {
        match field {
            ConversationSortField::CreatedAt => self.created_at,
            ConversationSortField::UpdatedAt => self.updated_at,
        }
    }
}

/// Ownership and visibility filter for conversation listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationScope {
    pub app_id: Uuid,
    pub principal: Principal,
    pub invoke_from: InvokeFrom,
}

impl ConversationScope {
    /// In-memory mirror of the SQL scope filter.
    #[cfg(test)]
    #[must_use]
    pub fn admits(&self, conversation: &Conversation) -> bool {
        !conversation.is_deleted
            && conversation.app_id == self.app_id
            && conversation.from_source == self.principal.from_source()
            && conversation.from_end_user_id == self.principal.end_user_id()
            && conversation.from_account_id == self.principal.account_id()
            && conversation
                .invoke_from
                .as_deref()
                .is_none_or(|v| v == self.invoke_from.as_str())
    }
}

// =============================================================================
// RECORD SOURCE
// =============================================================================

/// Postgres-backed record source for one [`ConversationScope`].
pub struct PgConversationSource<'a> {
    pool: &'a PgPool,
    scope: ConversationScope,
}

impl<'a> PgConversationSource<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool, scope: ConversationScope) -> Self {
        Self { pool, scope }
    }
}

fn push_owner(builder: &mut QueryBuilder<'static, Postgres>, app_id: Uuid, principal: Principal) {
    builder
        .push(" WHERE is_deleted = FALSE AND app_id = ")
        .push_bind(app_id)
        .push(" AND from_source = ")
        .push_bind(principal.from_source())
        .push(" AND from_end_user_id IS NOT DISTINCT FROM ")
        .push_bind(principal.end_user_id())
        .push(" AND from_account_id IS NOT DISTINCT FROM ")
        .push_bind(principal.account_id());
}

fn push_scope(builder: &mut QueryBuilder<'static, Postgres>, scope: &ConversationScope, ids: &IdFilter) {
    push_owner(builder, scope.app_id, scope.principal);
    builder
        .push(" AND (invoke_from IS NULL OR invoke_from = ")
        .push_bind(scope.invoke_from.as_str())
        .push(")");

    if let Some(include) = &ids.include {
        builder.push(" AND id = ANY(").push_bind(include.clone()).push(")");
    }
    if let Some(exclude) = &ids.exclude {
        builder.push(" AND NOT (id = ANY(").push_bind(exclude.clone()).push("))");
    }
}

fn push_boundary(
    builder: &mut QueryBuilder<'static, Postgres>,
    field: ConversationSortField,
    boundary: Option<&Boundary<OffsetDateTime>>,
) {
    if let Some(boundary) = boundary {
        builder
            .push(format!(" AND {} {} ", field.column(), boundary.operator()))
            .push_bind(boundary.key);
    }
}

pub(crate) fn select_one_query(scope: &ConversationScope, id: Uuid, ids: &IdFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {COLUMNS} FROM conversations"));
    push_scope(&mut builder, scope, ids);
    builder.push(" AND id = ").push_bind(id);
    builder
}

pub(crate) fn select_page_query(
    scope: &ConversationScope,
    query: &PageQuery<'_, ConversationSortField, OffsetDateTime>,
    limit: usize,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {COLUMNS} FROM conversations"));
    push_scope(&mut builder, scope, query.ids);
    push_boundary(&mut builder, query.sort.field, query.boundary.as_ref());

    let direction = query.sort.direction.as_sql();
    builder
        .push(format!(" ORDER BY {} {direction}, id {direction} LIMIT ", query.sort.field.column()))
        .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    builder
}

pub(crate) fn count_query(
    scope: &ConversationScope,
    query: &PageQuery<'_, ConversationSortField, OffsetDateTime>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM conversations");
    push_scope(&mut builder, scope, query.ids);
    push_boundary(&mut builder, query.sort.field, query.boundary.as_ref());
    builder
}

#[async_trait]
impl<'a> RecordSource for PgConversationSource<'a> {
    type Record = Conversation;

    async fn find(&self, id: Uuid, ids: &IdFilter) -> Result<Option<Conversation>, sqlx::Error> {
        select_one_query(&self.scope, id, ids)
            .build_query_as::<Conversation>()
            .fetch_optional(self.pool)
            .await
    }

    async fn fetch(
        &self,
        query: &PageQuery<'_, FieldOf<Self>, KeyOf<Self>>,
        limit: usize,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        select_page_query(&self.scope, query, limit)
            .build_query_as::<Conversation>()
            .fetch_all(self.pool)
            .await
    }

    async fn count(&self, query: &PageQuery<'_, FieldOf<Self>, KeyOf<Self>>) -> Result<u64, sqlx::Error> {
        let n: i64 = count_query(&self.scope, query)
            .build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

// =============================================================================
// LISTING
// =============================================================================

/// List one page of the scope's conversations.
///
/// # Errors
///
/// Returns `LastConversationNotFound` if `request.last_id` is not visible in
/// the scope, or a database error.
pub async fn list_conversations(
    pool: &PgPool,
    scope: ConversationScope,
    request: PageRequest<ConversationSortField>,
) -> Result<Page<Conversation>, ConversationError> {
    let source = PgConversationSource::new(pool, scope);
    Ok(pagination::paginate_by_last_id(&source, request).await?)
}

/// Ids of conversations the principal pinned in this app.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn pinned_conversation_ids(
    pool: &PgPool,
    app_id: Uuid,
    principal: Principal,
) -> Result<Vec<Uuid>, ConversationError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r"SELECT conversation_id
          FROM pinned_conversations
          WHERE app_id = $1 AND created_by_role = $2 AND created_by = $3",
    )
    .bind(app_id)
    .bind(principal.role())
    .bind(principal.id())
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

// =============================================================================
// SINGLE CONVERSATION
// =============================================================================

/// Fetch a conversation owned by `principal`.
///
/// # Errors
///
/// Returns `NotFound` if the conversation is missing, deleted, or owned by
/// someone else.
pub async fn get_conversation(
    pool: &PgPool,
    app_id: Uuid,
    principal: Principal,
    conversation_id: Uuid,
) -> Result<Conversation, ConversationError> {
    let mut builder = QueryBuilder::new(format!("SELECT {COLUMNS} FROM conversations"));
    push_owner(&mut builder, app_id, principal);
    builder.push(" AND id = ").push_bind(conversation_id);

    builder
        .build_query_as::<Conversation>()
        .fetch_optional(pool)
        .await?
        .ok_or(ConversationError::NotFound(conversation_id))
}

/// Set a conversation's name and bump `updated_at`.
///
/// # Errors
///
/// Returns `NotFound` if the principal does not own a live conversation with
/// this id.
pub async fn rename(
    pool: &PgPool,
    app_id: Uuid,
    principal: Principal,
    conversation_id: Uuid,
    name: &str,
) -> Result<Conversation, ConversationError> {
    let mut builder = QueryBuilder::new("UPDATE conversations SET name = ");
    builder.push_bind(name.to_owned()).push(", updated_at = now()");
    push_owner(&mut builder, app_id, principal);
    builder
        .push(" AND id = ")
        .push_bind(conversation_id)
        .push(format!(" RETURNING {COLUMNS}"));

    let conversation = builder
        .build_query_as::<Conversation>()
        .fetch_optional(pool)
        .await?
        .ok_or(ConversationError::NotFound(conversation_id))?;

    info!(%app_id, %conversation_id, %principal, "conversation renamed");
    Ok(conversation)
}

/// Soft-delete a conversation and bump `updated_at`.
///
/// # Errors
///
/// Returns `NotFound` if the principal does not own a live conversation with
/// this id.
pub async fn delete(
    pool: &PgPool,
    app_id: Uuid,
    principal: Principal,
    conversation_id: Uuid,
) -> Result<(), ConversationError> {
    let mut builder = QueryBuilder::new("UPDATE conversations SET is_deleted = TRUE, updated_at = now()");
    push_owner(&mut builder, app_id, principal);
    builder.push(" AND id = ").push_bind(conversation_id);

    let result = builder.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(ConversationError::NotFound(conversation_id));
    }

    info!(%app_id, %conversation_id, %principal, "conversation deleted");
    Ok(())
}

// =============================================================================
// AUTO NAMING
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[error("naming failed: {0}")]
pub struct NamingError(pub String);

/// Produces a conversation title from the conversation's first query.
#[async_trait]
pub trait ConversationNamer: Send + Sync {
    async fn name_for(&self, query: &str) -> Result<String, NamingError>;
}

/// Names a conversation after the start of its first query: at most
/// `max_chars` characters, with `...` appended when the query was cut.
#[derive(Debug, Clone, Copy)]
pub struct ExcerptNamer {
    pub max_chars: usize,
}

impl Default for ExcerptNamer {
    fn default() -> Self {
        Self { max_chars: 30 }
    }
}

#[async_trait]
impl ConversationNamer for ExcerptNamer {
    async fn name_for(&self, query: &str) -> Result<String, NamingError> {
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.is_empty() {
            return Err(NamingError("empty query".into()));
        }
        let collapsed = words.join(" ");
        if collapsed.chars().count() <= self.max_chars {
            return Ok(collapsed);
        }
        let mut excerpt: String = collapsed.chars().take(self.max_chars).collect();
        excerpt.push_str("...");
        Ok(excerpt)
    }
}

/// Rename a conversation from its first message.
///
/// # Errors
///
/// Returns `MessageNotFound` if the conversation has no messages, or a
/// database error. Namer failures are logged and leave the name unchanged.
pub async fn auto_generate_name(
    pool: &PgPool,
    namer: &dyn ConversationNamer,
    mut conversation: Conversation,
) -> Result<Conversation, ConversationError> {
    let first_query = sqlx::query_scalar::<_, String>(
        r"SELECT query
          FROM messages
          WHERE app_id = $1 AND conversation_id = $2
          ORDER BY created_at ASC
          LIMIT 1",
    )
    .bind(conversation.app_id)
    .bind(conversation.id)
    .fetch_optional(pool)
    .await?
    .ok_or(ConversationError::MessageNotFound(conversation.id))?;

    match namer.name_for(&first_query).await {
        Ok(name) => {
            sqlx::query("UPDATE conversations SET name = $1 WHERE id = $2")
                .bind(&name)
                .bind(conversation.id)
                .execute(pool)
                .await?;
            conversation.name = name;
        }
        Err(e) => {
            warn!(conversation_id = %conversation.id, error = %e, "conversation naming failed; keeping name");
        }
    }
    Ok(conversation)
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
