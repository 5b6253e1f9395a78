//! HTTP API layer.
//!
//! Thin glue: handlers authenticate, fetch the current snapshot from the
//! store, consult [`crate::policy`], and persist the decision. No
//! authorization logic lives in this module.

pub mod auth;
pub mod centers;
pub mod dashboard;
pub mod reports;
pub mod routes;
pub mod tasks;
pub mod types;
pub mod users;

use axum::http::StatusCode;

/// Map an internal failure to a 500, logging the cause server-side only.
pub(crate) fn internal_error<E: Into<anyhow::Error>>(err: E) -> (StatusCode, String) {
    let err = err.into();
    tracing::error!("internal error: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}
