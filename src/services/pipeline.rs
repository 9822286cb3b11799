//! Ingestion pipeline
//!
//! Drives every background job: screenshot analysis, spreadsheet load,
//! price refresh and spreadsheet split. One job runs as one spawned task
//! with sequential awaited steps; progress and log lines go through the
//! `JobTracker` so pollers always see a consistent record.
//!
//! Failure containment: a single image or item failure becomes a job log
//! line and the batch continues; storage failures abort the whole job with
//! the reason in the log. Cancellation is checked between images and
//! between items, never mid-write.

use crate::db::items::{self, NewItem};
use crate::error::{Error, Result};
use crate::models::{Category, ImageUpload, JobStatus, RecognizedItem};
use crate::services::enrichment::{MarketEnrichment, MarketInfo};
use crate::services::jobs::{JobTracker, JobUpdate};
use crate::services::spreadsheet::{self, SheetRow, SplitOutputs, SPLIT_THRESHOLD};
use crate::services::vision_client::ItemRecognizer;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How recognized quantities reconcile with existing session rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Add recognized quantities to existing rows
    Merge,
    /// Overwrite existing quantities with recognized ones
    Replace,
    /// Clear the session, seed it from a spreadsheet, then merge
    FreshWithSeed,
}

impl IngestMode {
    /// Parse the `mode` form field; fresh-with-seed is endpoint-selected,
    /// never caller-named.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(IngestMode::Merge),
            "replace" => Ok(IngestMode::Replace),
            other => Err(Error::InvalidInput(format!(
                "unknown mode {:?}, expected merge or replace",
                other
            ))),
        }
    }
}

/// Per-session async locks serializing reconcile cycles.
///
/// Two in-flight jobs for the same session must not interleave their
/// read-modify-write steps; jobs for different sessions stay independent.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, session: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(session.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Sum recognized quantities across images by exact name.
///
/// First occurrence fixes the position; later duplicates only add to the
/// count. Matching here is exact, the store's normalized matching happens
/// during reconciliation.
pub fn aggregate_items<I>(items: I) -> Vec<RecognizedItem>
where
    I: IntoIterator<Item = RecognizedItem>,
{
    let mut aggregated: Vec<RecognizedItem> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        if let Some(&at) = index.get(&item.name) {
            aggregated[at].quantity += item.quantity;
        } else {
            index.insert(item.name.clone(), aggregated.len());
            aggregated.push(item);
        }
    }

    aggregated
}

fn is_fatal(error: &Error) -> bool {
    matches!(
        error,
        Error::Database(_) | Error::Internal(_) | Error::Io(_)
    )
}

fn new_item_from(name: &str, quantity: i64, info: Option<MarketInfo>) -> NewItem {
    match info {
        Some(info) => NewItem {
            name: name.to_string(),
            quantity,
            sell_prices: info.sell_prices,
            buy_prices: info.buy_prices,
            avg_sell: info.avg_sell,
            avg_buy: info.avg_buy,
            market_id: Some(info.market_id),
            market_url: Some(info.market_url),
            category: Category::from_name(name),
        },
        None => NewItem::named(name).with_quantity(quantity),
    }
}

/// Everything a background job needs, cheap to clone into a spawned task
#[derive(Clone)]
pub struct IngestPipeline {
    db: SqlitePool,
    jobs: JobTracker,
    enrichment: Arc<MarketEnrichment>,
    session_locks: SessionLocks,
    split_cache: Arc<RwLock<HashMap<String, SplitOutputs>>>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl IngestPipeline {
    pub fn new(
        db: SqlitePool,
        jobs: JobTracker,
        enrichment: Arc<MarketEnrichment>,
        session_locks: SessionLocks,
        split_cache: Arc<RwLock<HashMap<String, SplitOutputs>>>,
        last_error: Arc<RwLock<Option<String>>>,
    ) -> Self {
        Self {
            db,
            jobs,
            enrichment,
            session_locks,
            split_cache,
            last_error,
        }
    }

    /// Analyze a screenshot batch and reconcile the results.
    ///
    /// `seed` rows apply only in fresh-with-seed mode.
    pub async fn run_image_batch(
        &self,
        job_id: Uuid,
        session: &str,
        recognizer: Arc<dyn ItemRecognizer>,
        images: Vec<ImageUpload>,
        mode: IngestMode,
        seed: Option<Vec<SheetRow>>,
        cancel: CancellationToken,
    ) {
        let result = self
            .image_batch(job_id, session, recognizer, images, mode, seed, cancel)
            .await;
        self.finish(job_id, result).await;
    }

    async fn image_batch(
        &self,
        job_id: Uuid,
        session: &str,
        recognizer: Arc<dyn ItemRecognizer>,
        images: Vec<ImageUpload>,
        mode: IngestMode,
        seed: Option<Vec<SheetRow>>,
        cancel: CancellationToken,
    ) -> Result<JobStatus> {
        self.start(job_id).await?;
        self.jobs
            .append_log(job_id, &format!("Analyzing {} image(s)", images.len()))
            .await?;

        let mut recognized: Vec<RecognizedItem> = Vec::new();
        for (index, image) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(JobStatus::Cancelled);
            }

            match recognizer.recognize(image).await {
                Ok(items) => {
                    self.jobs
                        .append_log(
                            job_id,
                            &format!("{}: recognized {} item(s)", image.file_name, items.len()),
                        )
                        .await?;
                    recognized.extend(items);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, file = %image.file_name, error = %e, "Image recognition failed");
                    self.jobs
                        .append_log(job_id, &format!("{}: recognition failed: {}", image.file_name, e))
                        .await?;
                }
            }

            self.jobs
                .update(
                    job_id,
                    JobUpdate {
                        processed_images: Some(index + 1),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let aggregated = aggregate_items(recognized);
        self.jobs
            .update(
                job_id,
                JobUpdate {
                    total_items: Some(aggregated.len()),
                    ..Default::default()
                },
            )
            .await?;

        let _guard = self.session_locks.lock(session).await;

        if mode == IngestMode::FreshWithSeed {
            let removed = items::clear(&self.db, session).await?;
            self.jobs
                .append_log(job_id, &format!("Cleared session ({} item(s) removed)", removed))
                .await?;

            if let Some(rows) = seed {
                let count = rows.len();
                for row in rows {
                    items::create(&self.db, session, row.into_new_item()).await?;
                }
                self.jobs
                    .append_log(job_id, &format!("Seeded {} row(s) from spreadsheet", count))
                    .await?;
            }
        }

        for (index, rec) in aggregated.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(JobStatus::Cancelled);
            }

            match self.reconcile_one(session, rec, mode).await {
                Ok(line) => self.jobs.append_log(job_id, &line).await?,
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, item = %rec.name, error = %e, "Item skipped");
                    self.jobs
                        .append_log(job_id, &format!("'{}' skipped: {}", rec.name, e))
                        .await?;
                }
            }

            self.jobs
                .update(
                    job_id,
                    JobUpdate {
                        processed_items: Some(index + 1),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(JobStatus::Completed)
    }

    /// Reconcile one aggregated recognition against the session store.
    ///
    /// Returns the human-readable log line describing what happened.
    async fn reconcile_one(
        &self,
        session: &str,
        rec: &RecognizedItem,
        mode: IngestMode,
    ) -> Result<String> {
        if let Some(existing) = items::find_by_name(&self.db, session, &rec.name).await? {
            let (new_quantity, line) = match mode {
                IngestMode::Replace => (
                    rec.quantity,
                    format!("Set '{}' quantity to {}", existing.name, rec.quantity),
                ),
                IngestMode::Merge | IngestMode::FreshWithSeed => (
                    existing.quantity + rec.quantity,
                    format!(
                        "Merged '{}': {} + {} = {}",
                        existing.name,
                        existing.quantity,
                        rec.quantity,
                        existing.quantity + rec.quantity
                    ),
                ),
            };
            items::update_quantity(&self.db, session, existing.id, new_quantity).await?;
            return Ok(line);
        }

        let info = self.enrichment.lookup(&rec.name).await;
        let matched = info.is_some();
        items::create(&self.db, session, new_item_from(&rec.name, rec.quantity, info)).await?;

        Ok(if matched {
            format!("Added '{}' x{} with market data", rec.name, rec.quantity)
        } else {
            format!("Added '{}' x{} (no market match)", rec.name, rec.quantity)
        })
    }

    /// Replace a session's contents with spreadsheet rows, verbatim.
    pub async fn run_spreadsheet_load(
        &self,
        job_id: Uuid,
        session: &str,
        rows: Vec<SheetRow>,
        cancel: CancellationToken,
    ) {
        let result = self.spreadsheet_load(job_id, session, rows, cancel).await;
        self.finish(job_id, result).await;
    }

    async fn spreadsheet_load(
        &self,
        job_id: Uuid,
        session: &str,
        rows: Vec<SheetRow>,
        cancel: CancellationToken,
    ) -> Result<JobStatus> {
        self.start(job_id).await?;
        self.jobs
            .append_log(job_id, &format!("Loading {} row(s) from spreadsheet", rows.len()))
            .await?;
        self.jobs
            .update(
                job_id,
                JobUpdate {
                    total_items: Some(rows.len()),
                    ..Default::default()
                },
            )
            .await?;

        let _guard = self.session_locks.lock(session).await;

        let removed = items::clear(&self.db, session).await?;
        self.jobs
            .append_log(job_id, &format!("Cleared session ({} item(s) removed)", removed))
            .await?;

        for (index, row) in rows.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(JobStatus::Cancelled);
            }

            let name = row.name.clone();
            items::create(&self.db, session, row.into_new_item()).await?;
            self.jobs
                .append_log(job_id, &format!("Loaded '{}'", name))
                .await?;
            self.jobs
                .update(
                    job_id,
                    JobUpdate {
                        processed_items: Some(index + 1),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(JobStatus::Completed)
    }

    /// Rebuild a session from spreadsheet names and quantities with live
    /// market lookups for every row.
    pub async fn run_price_refresh(
        &self,
        job_id: Uuid,
        session: &str,
        rows: Vec<SheetRow>,
        cancel: CancellationToken,
    ) {
        let result = self.price_refresh(job_id, session, rows, cancel).await;
        self.finish(job_id, result).await;
    }

    async fn price_refresh(
        &self,
        job_id: Uuid,
        session: &str,
        rows: Vec<SheetRow>,
        cancel: CancellationToken,
    ) -> Result<JobStatus> {
        self.start(job_id).await?;
        self.jobs
            .append_log(job_id, &format!("Refreshing prices for {} row(s)", rows.len()))
            .await?;
        self.jobs
            .update(
                job_id,
                JobUpdate {
                    total_items: Some(rows.len()),
                    ..Default::default()
                },
            )
            .await?;

        let _guard = self.session_locks.lock(session).await;

        let removed = items::clear(&self.db, session).await?;
        self.jobs
            .append_log(job_id, &format!("Cleared session ({} item(s) removed)", removed))
            .await?;

        for (index, row) in rows.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(JobStatus::Cancelled);
            }

            let info = self.enrichment.lookup(&row.name).await;
            let line = match &info {
                Some(info) => format!(
                    "Refreshed '{}': avg sell {:.2}, avg buy {:.2}",
                    row.name, info.avg_sell, info.avg_buy
                ),
                None => format!("'{}' not in catalog, kept without prices", row.name),
            };
            items::create(&self.db, session, new_item_from(&row.name, row.quantity, info)).await?;

            self.jobs.append_log(job_id, &line).await?;
            self.jobs
                .update(
                    job_id,
                    JobUpdate {
                        processed_items: Some(index + 1),
                        ..Default::default()
                    },
                )
                .await?;
        }

        Ok(JobStatus::Completed)
    }

    /// Partition an uploaded sheet by quantity and cache both halves for
    /// download. The store is never touched.
    pub async fn run_split(&self, job_id: Uuid, session: &str, data: Vec<u8>) {
        let result = self.split(job_id, session, data).await;
        self.finish(job_id, result).await;
    }

    async fn split(&self, job_id: Uuid, session: &str, data: Vec<u8>) -> Result<JobStatus> {
        self.start(job_id).await?;
        self.jobs
            .append_log(
                job_id,
                &format!("Splitting spreadsheet at quantity threshold {}", SPLIT_THRESHOLD),
            )
            .await?;

        let outputs = spreadsheet::split_by_quantity(&data)?;
        let (low_rows, high_rows) = (outputs.low_rows, outputs.high_rows);

        self.split_cache
            .write()
            .await
            .insert(session.to_string(), outputs);

        self.jobs
            .update(
                job_id,
                JobUpdate {
                    total_items: Some(low_rows + high_rows),
                    processed_items: Some(low_rows + high_rows),
                    ..Default::default()
                },
            )
            .await?;
        self.jobs
            .append_log(
                job_id,
                &format!("Split complete: {} low row(s), {} high row(s)", low_rows, high_rows),
            )
            .await?;

        Ok(JobStatus::Completed)
    }

    async fn start(&self, job_id: Uuid) -> Result<()> {
        self.jobs
            .update(
                job_id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Record the job's outcome. Nothing escapes past here; pollers read
    /// failures from the job record.
    async fn finish(&self, job_id: Uuid, result: Result<JobStatus>) {
        let (status, log_line) = match result {
            Ok(JobStatus::Cancelled) => (JobStatus::Cancelled, "Cancelled by request".to_string()),
            Ok(status) => (status, "Done".to_string()),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Job failed");
                *self.last_error.write().await = Some(e.to_string());
                (JobStatus::Failed, format!("Job failed: {}", e))
            }
        };

        if let Err(e) = self.jobs.append_log(job_id, &log_line).await {
            tracing::warn!(job_id = %job_id, error = %e, "Could not record job outcome log");
        }
        if let Err(e) = self
            .jobs
            .update(
                job_id,
                JobUpdate {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "Could not record job outcome status");
        }
    }
}
