//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Console endpoints live under `/console/api` and authenticate with the
//! console session; web-app endpoints live under `/api` and authenticate
//! with a passport. Every request gets a request id before the trace span
//! opens.

pub mod auth;
pub mod conversations;
pub mod passport;

use axum::Router;
use axum::extract::Request;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::logging;
use crate::state::AppState;

/// Full HTTP application.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/console/api/login", post(auth::login))
        .route("/console/api/logout", post(auth::logout))
        .route("/console/api/refresh-token", post(auth::refresh_token))
        .route("/console/api/apps/{app_id}/conversations", get(conversations::console_list))
        .route(
            "/console/api/apps/{app_id}/conversations/{id}",
            get(conversations::console_get).delete(conversations::console_delete),
        )
        .route("/console/api/apps/{app_id}/conversations/{id}/name", post(conversations::console_rename))
        .route("/api/passport", get(passport::get_passport))
        .route("/api/conversations", get(conversations::web_list))
        .route(
            "/api/conversations/{id}",
            get(conversations::web_get).delete(conversations::web_delete),
        )
        .route("/api/conversations/{id}/name", post(conversations::web_rename))
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| logging::request_span(req)))
        .layer(axum::middleware::from_fn(logging::assign_request_id))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
