//! Market catalog maintenance endpoint

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// POST /catalog/refresh
///
/// Re-fetch the market catalog. On failure the previous cache stays in
/// place and the caller gets a 502.
pub async fn refresh_catalog(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let entries = state
        .enrichment
        .refresh_catalog()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    tracing::info!(entries, "Market catalog refreshed");

    Ok(Json(json!({ "entries": entries })))
}

/// Build catalog routes
pub fn catalog_routes() -> Router<AppState> {
    Router::new().route("/catalog/refresh", post(refresh_catalog))
}
