//! Session inventory endpoints

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::api::SessionKey;
use crate::db::items;
use crate::error::ApiResult;
use crate::models::{round2, InventoryItem};
use crate::services::spreadsheet;
use crate::AppState;

/// GET /inventory
///
/// List the session's items in insertion order.
pub async fn list_items(
    State(state): State<AppState>,
    session: SessionKey,
) -> ApiResult<Json<serde_json::Value>> {
    let list = items::list(&state.db, &session.0).await?;

    Ok(Json(json!({
        "items": list,
        "count": list.len(),
    })))
}

/// Aggregate view of one session's inventory
#[derive(Debug, Serialize)]
pub struct InventoryStats {
    pub distinct_items: usize,
    pub total_quantity: i64,
    /// Sum of quantity times average sell price, 2 decimals
    pub total_value: f64,
    /// Value per unit held, 0 for an empty session
    pub avg_item_value: f64,
}

/// GET /inventory/stats
pub async fn inventory_stats(
    State(state): State<AppState>,
    session: SessionKey,
) -> ApiResult<Json<InventoryStats>> {
    let list = items::list(&state.db, &session.0).await?;

    let total_quantity: i64 = list.iter().map(|i| i.quantity).sum();
    let raw_value: f64 = list.iter().map(|i| i.quantity as f64 * i.avg_sell).sum();
    let total_value = round2(raw_value);
    let avg_item_value = if total_quantity > 0 {
        round2(total_value / total_quantity as f64)
    } else {
        0.0
    };

    Ok(Json(InventoryStats {
        distinct_items: list.len(),
        total_quantity,
        total_value,
        avg_item_value,
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// PATCH /inventory/{id}
///
/// Set an item's quantity. 404 for an unknown id, 400 for a negative
/// quantity.
pub async fn update_quantity(
    State(state): State<AppState>,
    session: SessionKey,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateQuantityRequest>,
) -> ApiResult<Json<InventoryItem>> {
    let item = items::update_quantity(&state.db, &session.0, id, request.quantity).await?;

    tracing::info!(session = %session.0, item_id = %id, quantity = request.quantity, "Quantity updated");

    Ok(Json(item))
}

/// DELETE /inventory/{id}
///
/// Remove one item; deleting an absent id is a no-op.
pub async fn delete_item(
    State(state): State<AppState>,
    session: SessionKey,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    items::delete(&state.db, &session.0, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /inventory
///
/// Clear the whole session.
pub async fn clear_items(
    State(state): State<AppState>,
    session: SessionKey,
) -> ApiResult<StatusCode> {
    let removed = items::clear(&state.db, &session.0).await?;

    tracing::info!(session = %session.0, removed, "Inventory cleared");

    Ok(StatusCode::NO_CONTENT)
}

/// GET /inventory/export
///
/// Download the session as a CSV attachment.
pub async fn export_inventory(
    State(state): State<AppState>,
    session: SessionKey,
) -> ApiResult<impl IntoResponse> {
    let list = items::list(&state.db, &session.0).await?;
    let csv = spreadsheet::export_csv(&list)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"inventory.csv\"",
            ),
        ],
        csv,
    ))
}

/// Build inventory routes
pub fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(list_items).delete(clear_items))
        .route("/inventory/stats", get(inventory_stats))
        .route("/inventory/export", get(export_inventory))
        .route("/inventory/:id", patch(update_quantity).delete(delete_item))
}
