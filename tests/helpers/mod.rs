//! Shared test utilities: in-memory database, scripted service fakes and
//! multipart body builders.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use stashscan::models::{ImageUpload, ProcessingJob, RecognizedItem};
use stashscan::services::enrichment::MarketEnrichment;
use stashscan::services::jobs::JobTracker;
use stashscan::services::market_client::{
    CatalogEntry, MarketDataSource, MarketError, MarketOrder, OrderKind,
};
use stashscan::services::vision_client::{ItemRecognizer, VisionError};
use stashscan::AppState;

/// Minimal valid PNG magic bytes plus padding
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n0000000000";
/// Minimal valid JPEG magic bytes plus padding
pub const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE00000000000";

pub const MULTIPART_BOUNDARY: &str = "stashscan-test-boundary";

/// In-memory pool with the schema applied.
///
/// One connection only: each pooled connection would otherwise get its own
/// private `:memory:` database.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    stashscan::db::init_tables(&pool).await.unwrap();
    pool
}

/// Recognizer returning scripted results keyed by upload file name
#[derive(Default)]
pub struct FakeRecognizer {
    replies: HashMap<String, Vec<RecognizedItem>>,
    failing: HashSet<String>,
}

impl FakeRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, file_name: &str, items: Vec<RecognizedItem>) -> Self {
        self.replies.insert(file_name.to_string(), items);
        self
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }
}

#[async_trait]
impl ItemRecognizer for FakeRecognizer {
    async fn recognize(&self, image: &ImageUpload) -> Result<Vec<RecognizedItem>, VisionError> {
        if self.failing.contains(&image.file_name) {
            return Err(VisionError::Api(500, "scripted failure".to_string()));
        }
        Ok(self.replies.get(&image.file_name).cloned().unwrap_or_default())
    }
}

/// Market source with a fixed catalog and per-item order books
#[derive(Default)]
pub struct FakeMarket {
    catalog: Vec<CatalogEntry>,
    orders: HashMap<String, Vec<MarketOrder>>,
    fail_catalog: bool,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, id: &str, name: &str, sells: &[f64], buys: &[f64]) -> Self {
        self.catalog.push(CatalogEntry {
            id: id.to_string(),
            name: name.to_string(),
        });
        let mut orders = Vec::new();
        for &price in sells {
            orders.push(MarketOrder {
                kind: OrderKind::Sell,
                price,
            });
        }
        for &price in buys {
            orders.push(MarketOrder {
                kind: OrderKind::Buy,
                price,
            });
        }
        self.orders.insert(id.to_string(), orders);
        self
    }

    pub fn failing_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }
}

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, MarketError> {
        if self.fail_catalog {
            return Err(MarketError::Api(503, "catalog down".to_string()));
        }
        Ok(self.catalog.clone())
    }

    async fn fetch_orders(&self, market_id: &str) -> Result<Vec<MarketOrder>, MarketError> {
        self.orders
            .get(market_id)
            .cloned()
            .ok_or_else(|| MarketError::Api(404, format!("no orders for {}", market_id)))
    }
}

/// Build app state around the given fakes, with the catalog warmed.
pub async fn test_state_with(
    market: FakeMarket,
    recognizer: Option<Arc<dyn ItemRecognizer>>,
) -> AppState {
    let pool = memory_pool().await;
    let enrichment = Arc::new(MarketEnrichment::new(Arc::new(market), "https://market.test"));
    // A scripted catalog failure is part of some tests
    let _ = enrichment.refresh_catalog().await;
    AppState::new(pool, enrichment, recognizer)
}

/// App state with an empty market and a recognizer that sees nothing
pub async fn test_state() -> AppState {
    test_state_with(FakeMarket::new(), Some(Arc::new(FakeRecognizer::new()))).await
}

/// Multipart form body in the exact shape the ingest endpoints read
pub fn multipart_body(
    images: &[(&str, &[u8])],
    mode: Option<&str>,
    spreadsheet: Option<&str>,
) -> Vec<u8> {
    let mut body = Vec::new();

    for (file_name, bytes) in images {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                MULTIPART_BOUNDARY, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }

    if let Some(mode) = mode {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"mode\"\r\n\r\n{}\r\n",
                MULTIPART_BOUNDARY, mode
            )
            .as_bytes(),
        );
    }

    if let Some(sheet) = spreadsheet {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"spreadsheet\"; filename=\"sheet.csv\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n",
                MULTIPART_BOUNDARY, sheet
            )
            .as_bytes(),
        );
    }

    body.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY)
}

/// Poll the tracker until the job settles.
pub async fn wait_for_terminal(jobs: &JobTracker, id: Uuid) -> ProcessingJob {
    for _ in 0..500 {
        if let Some(job) = jobs.get(id).await {
            if job.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach a terminal status in time", id);
}
