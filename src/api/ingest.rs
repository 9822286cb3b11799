//! Screenshot ingestion endpoints
//!
//! Both endpoints validate the upload synchronously, answer 202 with a job
//! id and hand the batch to a spawned pipeline task. Recognition results
//! arrive through `GET /jobs/{id}` polling, never through this response.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::SessionKey;
use crate::error::{ApiError, ApiResult};
use crate::models::{ImageUpload, JobKind};
use crate::services::pipeline::IngestMode;
use crate::services::spreadsheet::{self, SheetRow};
use crate::services::vision_client::ItemRecognizer;
use crate::AppState;

/// Largest accepted screenshot
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

struct AnalyzeUpload {
    images: Vec<ImageUpload>,
    mode: Option<String>,
    spreadsheet: Option<Vec<u8>>,
}

fn validate_image(file_name: &str, bytes: &[u8]) -> ApiResult<()> {
    if bytes.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "{}: image part is empty",
            file_name
        )));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::BadRequest(format!(
            "{}: image exceeds the 10 MB limit",
            file_name
        )));
    }

    // Sniff the real content type; the multipart headers are not trusted
    match infer::get(bytes) {
        Some(kind) if matches!(kind.mime_type(), "image/jpeg" | "image/png") => Ok(()),
        _ => Err(ApiError::BadRequest(format!(
            "{}: only JPEG and PNG screenshots are accepted",
            file_name
        ))),
    }
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<AnalyzeUpload> {
    let mut upload = AnalyzeUpload {
        images: Vec::new(),
        mode: None,
        spreadsheet: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or("screenshot").to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Could not read image {}: {}", file_name, e))
                })?;
                validate_image(&file_name, &bytes)?;
                upload.images.push(ImageUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "mode" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Could not read mode field: {}", e))
                })?;
                upload.mode = Some(text);
            }
            "spreadsheet" => {
                let bytes = field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Could not read spreadsheet field: {}", e))
                })?;
                upload.spreadsheet = Some(bytes.to_vec());
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(upload)
}

fn require_recognizer(state: &AppState) -> ApiResult<Arc<dyn ItemRecognizer>> {
    state.recognizer.clone().ok_or_else(|| {
        ApiError::Unavailable(
            "vision recognition is not configured (set STASHSCAN_VISION_API_KEY)".to_string(),
        )
    })
}

/// Register a job and hand the batch to a background task.
async fn spawn_analysis(
    state: AppState,
    session: String,
    recognizer: Arc<dyn ItemRecognizer>,
    images: Vec<ImageUpload>,
    mode: IngestMode,
    seed: Option<Vec<SheetRow>>,
) -> Uuid {
    let job = state.jobs.create(JobKind::ImageAnalysis, images.len()).await;
    let job_id = job.id;

    let token = CancellationToken::new();
    state
        .cancellation_tokens
        .write()
        .await
        .insert(job_id, token.clone());

    let pipeline = state.pipeline();
    let state_clone = state.clone();
    tokio::spawn(async move {
        pipeline
            .run_image_batch(job_id, &session, recognizer, images, mode, seed, token)
            .await;
        state_clone
            .cancellation_tokens
            .write()
            .await
            .remove(&job_id);
    });

    job_id
}

/// POST /ingest/analyze
///
/// Multipart body: repeated `image` parts plus an optional `mode` text part
/// (`merge` by default, or `replace`). Returns 202 with the job id.
pub async fn analyze(
    State(state): State<AppState>,
    session: SessionKey,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let recognizer = require_recognizer(&state)?;

    let upload = read_upload(multipart).await?;
    if upload.images.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one image part is required".to_string(),
        ));
    }

    let mode = match upload.mode.as_deref() {
        Some(value) => IngestMode::parse(value)?,
        None => IngestMode::Merge,
    };

    tracing::info!(
        session = %session.0,
        images = upload.images.len(),
        mode = ?mode,
        "Screenshot analysis accepted"
    );

    let job_id = spawn_analysis(state, session.0, recognizer, upload.images, mode, None).await;

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

/// POST /ingest/analyze-with-seed
///
/// Like `analyze`, but the session is cleared first and the optional
/// `spreadsheet` part is loaded as the starting inventory before the
/// recognitions merge in. The seed sheet is validated synchronously.
pub async fn analyze_with_seed(
    State(state): State<AppState>,
    session: SessionKey,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let recognizer = require_recognizer(&state)?;

    let upload = read_upload(multipart).await?;
    if upload.images.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one image part is required".to_string(),
        ));
    }

    let seed = match upload.spreadsheet {
        Some(data) => Some(spreadsheet::parse_csv(&data)?),
        None => None,
    };

    tracing::info!(
        session = %session.0,
        images = upload.images.len(),
        seed_rows = seed.as_ref().map(Vec::len).unwrap_or(0),
        "Fresh analysis with seed accepted"
    );

    let job_id = spawn_analysis(
        state,
        session.0,
        recognizer,
        upload.images,
        IngestMode::FreshWithSeed,
        seed,
    )
    .await;

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/ingest/analyze", post(analyze))
        .route("/ingest/analyze-with-seed", post(analyze_with_seed))
}
