//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence so route handlers can
//! stay focused on request parsing, auth extraction and status mapping. Each
//! service returns its own error enum tagged with an `ErrorCode`.

pub mod account;
pub mod app;
pub mod conversation;
pub mod passport;
pub mod session;
