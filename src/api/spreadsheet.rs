//! Spreadsheet import, price refresh and split endpoints

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::SessionKey;
use crate::error::{ApiError, ApiResult};
use crate::models::JobKind;
use crate::services::spreadsheet::{self, SheetRow};
use crate::AppState;

async fn read_spreadsheet(mut multipart: Multipart) -> ApiResult<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("spreadsheet") {
            let bytes = field.bytes().await.map_err(|e| {
                ApiError::BadRequest(format!("Could not read spreadsheet field: {}", e))
            })?;
            return Ok(bytes.to_vec());
        }
    }

    Err(ApiError::BadRequest(
        "missing spreadsheet part".to_string(),
    ))
}

/// Parse and validate the upload before any job is registered, so a
/// malformed sheet is a synchronous 400 instead of a failed job.
async fn read_rows(multipart: Multipart) -> ApiResult<Vec<SheetRow>> {
    let data = read_spreadsheet(multipart).await?;
    Ok(spreadsheet::parse_csv(&data)?)
}

/// POST /spreadsheet/load
///
/// Replace the session's inventory with the uploaded sheet, rows verbatim.
pub async fn load(
    State(state): State<AppState>,
    session: SessionKey,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let rows = read_rows(multipart).await?;

    let job = state.jobs.create(JobKind::SpreadsheetLoad, 0).await;
    let job_id = job.id;

    let token = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(job_id, token.clone());

    tracing::info!(session = %session.0, rows = rows.len(), "Spreadsheet load accepted");

    let pipeline = state.pipeline();
    let session_key = session.0;
    let state_clone = state.clone();
    tokio::spawn(async move {
        pipeline
            .run_spreadsheet_load(job_id, &session_key, rows, token)
            .await;
        state_clone
            .cancellation_tokens
            .write()
            .await
            .remove(&job_id);
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

/// POST /spreadsheet/refresh-prices
///
/// Rebuild the session from the sheet's names and quantities with a live
/// market lookup per row.
pub async fn refresh_prices(
    State(state): State<AppState>,
    session: SessionKey,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let rows = read_rows(multipart).await?;

    let job = state.jobs.create(JobKind::PriceRefresh, 0).await;
    let job_id = job.id;

    let token = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(job_id, token.clone());

    tracing::info!(session = %session.0, rows = rows.len(), "Price refresh accepted");

    let pipeline = state.pipeline();
    let session_key = session.0;
    let state_clone = state.clone();
    tokio::spawn(async move {
        pipeline
            .run_price_refresh(job_id, &session_key, rows, token)
            .await;
        state_clone
            .cancellation_tokens
            .write()
            .await
            .remove(&job_id);
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

/// POST /spreadsheet/split
///
/// Partition the uploaded sheet by quantity; outputs are cached for the
/// session and fetched with `GET /spreadsheet/split/{low|high}`. The sheet
/// is passed through raw, so even rows too dirty to import can be split.
pub async fn split(
    State(state): State<AppState>,
    session: SessionKey,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let data = read_spreadsheet(multipart).await?;

    let job = state.jobs.create(JobKind::SpreadsheetSplit, 0).await;
    let job_id = job.id;

    tracing::info!(session = %session.0, bytes = data.len(), "Spreadsheet split accepted");

    let pipeline = state.pipeline();
    let session_key = session.0;
    tokio::spawn(async move {
        pipeline.run_split(job_id, &session_key, data).await;
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

/// GET /spreadsheet/split/{kind}
///
/// Download one half of the most recent split for this session.
pub async fn download_split(
    State(state): State<AppState>,
    session: SessionKey,
    Path(kind): Path<String>,
) -> ApiResult<impl IntoResponse> {
    if kind != "low" && kind != "high" {
        return Err(ApiError::BadRequest(format!(
            "unknown split output {:?}, expected low or high",
            kind
        )));
    }

    let outputs = state
        .split_cache
        .read()
        .await
        .get(&session.0)
        .cloned()
        .ok_or_else(|| {
            ApiError::NotFound("no split outputs cached for this session".to_string())
        })?;

    let (csv, filename) = if kind == "low" {
        (outputs.low, "inventory_low.csv")
    } else {
        (outputs.high, "inventory_high.csv")
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        csv,
    ))
}

/// Build spreadsheet routes
pub fn spreadsheet_routes() -> Router<AppState> {
    Router::new()
        .route("/spreadsheet/load", post(load))
        .route("/spreadsheet/refresh-prices", post(refresh_prices))
        .route("/spreadsheet/split", post(split))
        .route("/spreadsheet/split/:kind", get(download_split))
}
