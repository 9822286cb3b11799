//! stashscan: screenshot-driven game inventory service
//!
//! Screenshots go in, a market-priced inventory comes out. Uploaded images
//! are read by a vision model, recognized items are matched against a
//! cached market catalog, enriched with live order-book prices and stored
//! per session. The inventory round-trips through CSV spreadsheets and can
//! be partitioned by quantity. All slow work runs as pollable background
//! jobs.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::services::enrichment::MarketEnrichment;
use crate::services::jobs::JobTracker;
use crate::services::pipeline::{IngestPipeline, SessionLocks};
use crate::services::spreadsheet::SplitOutputs;
use crate::services::vision_client::ItemRecognizer;

/// Room for a batch of screenshots in one multipart body
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// In-memory job registry
    pub jobs: JobTracker,
    /// Catalog cache plus order-book source
    pub enrichment: Arc<MarketEnrichment>,
    /// `None` when no vision API key is configured
    pub recognizer: Option<Arc<dyn ItemRecognizer>>,
    /// Cancellation tokens for running jobs
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Per-session reconcile locks
    pub session_locks: SessionLocks,
    /// Cached split outputs per session
    pub split_cache: Arc<RwLock<HashMap<String, SplitOutputs>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background job error, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        enrichment: Arc<MarketEnrichment>,
        recognizer: Option<Arc<dyn ItemRecognizer>>,
    ) -> Self {
        Self {
            db,
            jobs: JobTracker::new(),
            enrichment,
            recognizer,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            session_locks: SessionLocks::new(),
            split_cache: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Pipeline handle for spawning background jobs.
    pub fn pipeline(&self) -> IngestPipeline {
        IngestPipeline::new(
            self.db.clone(),
            self.jobs.clone(),
            self.enrichment.clone(),
            self.session_locks.clone(),
            self.split_cache.clone(),
            self.last_error.clone(),
        )
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::inventory_routes())
        .merge(api::ingest_routes())
        .merge(api::spreadsheet_routes())
        .merge(api::job_routes())
        .merge(api::catalog_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
