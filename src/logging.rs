//! Tracing setup and per-request ids.
//!
//! Every request is tagged with a [`RequestId`] before the trace layer opens
//! its span, so the id is a field on all events logged while handling it.
//! Handlers that need the id take it as an explicit `Extension<RequestId>`.

use std::fmt;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Span;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Install the global `fmt` subscriber at `level`.
pub fn init(level: tracing::Level) {
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware: attach a fresh [`RequestId`] and echo it in the response.
pub async fn assign_request_id(mut req: Request, next: Next) -> Response {
    let id = RequestId::generate();
    req.extensions_mut().insert(id.clone());

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.0) {
        res.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    res
}

/// Span factory for `TraceLayer::make_span_with`.
pub fn request_span<B>(req: &axum::http::Request<B>) -> Span {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(|| "-".to_owned(), ToString::to_string);
    tracing::info_span!(
        "request",
        method = %req.method(),
        uri = %req.uri(),
        request_id = %request_id,
    )
}
