//! HTTP API handlers for stashscan

pub mod catalog;
pub mod health;
pub mod ingest;
pub mod inventory;
pub mod jobs;
pub mod spreadsheet;

pub use catalog::catalog_routes;
pub use health::health_routes;
pub use ingest::ingest_routes;
pub use inventory::inventory_routes;
pub use jobs::job_routes;
pub use spreadsheet::spreadsheet_routes;

use crate::error::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Header carrying the caller's session key
pub const SESSION_HEADER: &str = "X-Session-Key";

/// Extracts the session key every inventory-scoped endpoint requires.
///
/// A missing or empty header is a 400; there is no implicit default
/// session, so a caller can never read another caller's rows by accident.
pub struct SessionKey(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for SessionKey
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::BadRequest(format!("missing {} header", SESSION_HEADER))
            })?;

        Ok(SessionKey(value.to_string()))
    }
}
