//! Conversation routes for console accounts and web-app end users.
//!
//! Console routes scope to `/console/api/apps/{app_id}` and require tenant
//! membership; web routes take the app from the caller's passport. Both
//! share the list, rename and delete plumbing below.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::pagination::{IdFilter, Page, PageRequest, SortSpec};
use crate::principal::{InvokeFrom, Principal};
use crate::routes::auth::AuthAccount;
use crate::routes::passport::WebAuth;
use crate::services::app;
use crate::services::conversation::{
    self, Conversation, ConversationError, ConversationScope, ConversationSortField, DEFAULT_SORT,
};
use crate::state::AppState;

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

// =============================================================================
// REQUEST PARSING
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub last_id: Option<Uuid>,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    /// `true` lists only pinned conversations, `false` hides them.
    pub pinned: Option<bool>,
}

impl ListQuery {
    /// Validate limit and sort; the id filter is filled in later.
    pub(crate) fn page_request(&self) -> Result<PageRequest<ConversationSortField>, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::bad_request(
                "invalid_param",
                format!("limit must be between 1 and {MAX_LIMIT}"),
            ));
        }
        let sort = SortSpec::<ConversationSortField>::parse(self.sort_by.as_deref().unwrap_or(DEFAULT_SORT))
            .map_err(|e| ApiError::bad_request("invalid_param", e.to_string()))?;
        Ok(PageRequest { sort, last_id: self.last_id, limit, ids: IdFilter::default() })
    }
}

/// Pinned ids become the include set (`pinned=true`) or the exclude set.
pub(crate) fn pinned_filter(pinned: Option<bool>, pinned_ids: Vec<Uuid>) -> IdFilter {
    match pinned {
        Some(true) => IdFilter { include: Some(pinned_ids), exclude: None },
        Some(false) => IdFilter { include: None, exclude: Some(pinned_ids) },
        None => IdFilter::default(),
    }
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub name: Option<String>,
    #[serde(default)]
    pub auto_generate: bool,
}

pub(crate) fn conversation_error(err: ConversationError) -> ApiError {
    let status = match &err {
        ConversationError::LastConversationNotFound(_) => StatusCode::BAD_REQUEST,
        ConversationError::NotFound(_) | ConversationError::MessageNotFound(_) => StatusCode::NOT_FOUND,
        ConversationError::Database(e) => return ApiError::internal(e),
    };
    ApiError::from_coded(status, &err)
}

// =============================================================================
// SHARED HANDLING
// =============================================================================

async fn list_in_scope(
    state: &AppState,
    scope: ConversationScope,
    query: &ListQuery,
) -> Result<Page<Conversation>, ApiError> {
    let mut request = query.page_request()?;
    if query.pinned.is_some() {
        let ids = conversation::pinned_conversation_ids(&state.pool, scope.app_id, scope.principal)
            .await
            .map_err(conversation_error)?;
        request.ids = pinned_filter(query.pinned, ids);
    }
    conversation::list_conversations(&state.pool, scope, request)
        .await
        .map_err(conversation_error)
}

async fn rename_owned(
    state: &AppState,
    app_id: Uuid,
    principal: Principal,
    conversation_id: Uuid,
    body: RenameBody,
) -> Result<Conversation, ConversationError> {
    if body.auto_generate {
        let existing = conversation::get_conversation(&state.pool, app_id, principal, conversation_id).await?;
        return conversation::auto_generate_name(&state.pool, state.namer.as_ref(), existing).await;
    }
    let name = body.name.as_deref().map(str::trim).unwrap_or_default();
    conversation::rename(&state.pool, app_id, principal, conversation_id, name).await
}

fn validate_rename(body: &RenameBody) -> Result<(), ApiError> {
    let blank = body.name.as_deref().is_none_or(|n| n.trim().is_empty());
    if !body.auto_generate && blank {
        return Err(ApiError::bad_request("invalid_param", "name is required"));
    }
    Ok(())
}

async fn console_app(state: &AppState, auth: &AuthAccount, app_id: Uuid) -> Result<(), ApiError> {
    app::find_app_for_account(&state.pool, app_id, auth.account_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found("app_not_found", "App not found."))
}

// =============================================================================
// CONSOLE HANDLERS
// =============================================================================

/// `GET /console/api/apps/{app_id}/conversations`
pub async fn console_list(
    State(state): State<AppState>,
    auth: AuthAccount,
    Path(app_id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Conversation>>, ApiError> {
    console_app(&state, &auth, app_id).await?;
    let scope = ConversationScope { app_id, principal: auth.principal(), invoke_from: InvokeFrom::Explore };
    Ok(Json(list_in_scope(&state, scope, &query).await?))
}

/// `GET /console/api/apps/{app_id}/conversations/{id}`
pub async fn console_get(
    State(state): State<AppState>,
    auth: AuthAccount,
    Path((app_id, conversation_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Conversation>, ApiError> {
    console_app(&state, &auth, app_id).await?;
    conversation::get_conversation(&state.pool, app_id, auth.principal(), conversation_id)
        .await
        .map(Json)
        .map_err(conversation_error)
}

/// `POST /console/api/apps/{app_id}/conversations/{id}/name`
pub async fn console_rename(
    State(state): State<AppState>,
    auth: AuthAccount,
    Path((app_id, conversation_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<RenameBody>,
) -> Result<Json<Conversation>, ApiError> {
    validate_rename(&body)?;
    console_app(&state, &auth, app_id).await?;
    rename_owned(&state, app_id, auth.principal(), conversation_id, body)
        .await
        .map(Json)
        .map_err(conversation_error)
}

/// `DELETE /console/api/apps/{app_id}/conversations/{id}`
pub async fn console_delete(
    State(state): State<AppState>,
    auth: AuthAccount,
    Path((app_id, conversation_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    console_app(&state, &auth, app_id).await?;
    conversation::delete(&state.pool, app_id, auth.principal(), conversation_id)
        .await
        .map_err(conversation_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// WEB HANDLERS
// =============================================================================

/// `GET /api/conversations`
pub async fn web_list(
    State(state): State<AppState>,
    WebAuth(visitor): WebAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Conversation>>, ApiError> {
    let scope = ConversationScope { app_id: visitor.app_id, principal: visitor.principal(), invoke_from: InvokeFrom::WebApp };
    Ok(Json(list_in_scope(&state, scope, &query).await?))
}

/// `GET /api/conversations/{id}`
pub async fn web_get(
    State(state): State<AppState>,
    WebAuth(visitor): WebAuth,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
    conversation::get_conversation(&state.pool, visitor.app_id, visitor.principal(), conversation_id)
        .await
        .map(Json)
        .map_err(conversation_error)
}

/// `POST /api/conversations/{id}/name`
pub async fn web_rename(
    State(state): State<AppState>,
    WebAuth(visitor): WebAuth,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<RenameBody>,
) -> Result<Json<Conversation>, ApiError> {
    validate_rename(&body)?;
    rename_owned(&state, visitor.app_id, visitor.principal(), conversation_id, body)
        .await
        .map(Json)
        .map_err(conversation_error)
}

/// `DELETE /api/conversations/{id}`
pub async fn web_delete(
    State(state): State<AppState>,
    WebAuth(visitor): WebAuth,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    conversation::delete(&state.pool, visitor.app_id, visitor.principal(), conversation_id)
        .await
        .map_err(conversation_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "conversations_test.rs"]
mod tests;
