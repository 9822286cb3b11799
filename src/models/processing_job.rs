//! Processing job state machine
//!
//! A job tracks one asynchronous unit of work:
//! `pending → processing → completed | cancelled | failed`.
//! The three right-hand states are terminal; once reached, the status never
//! changes again. Consumers poll; there is no notification channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Registered but not started
    Pending,
    /// Background task is running
    Processing,
    /// Finished successfully (items may still lack market data)
    Completed,
    /// Stopped early by a caller cancel request
    Cancelled,
    /// The outer pipeline aborted
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }
}

/// What kind of work the job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Screenshot batch analysis + reconciliation
    ImageAnalysis,
    /// Spreadsheet import as full replacement
    SpreadsheetLoad,
    /// Rebuild a session from a spreadsheet with live price lookups
    PriceRefresh,
    /// Price-threshold split of an uploaded spreadsheet
    SpreadsheetSplit,
}

/// One tracked asynchronous unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,

    /// Image-step counters; zero for jobs without an image step
    pub total_images: usize,
    pub processed_images: usize,

    /// Reconciliation-step counters
    pub total_items: usize,
    pub processed_items: usize,

    /// Append-only, timestamp-prefixed log lines
    pub logs: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    pub fn new(kind: JobKind, status: JobStatus, total_images: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status,
            total_images,
            processed_images: 0,
            total_items: 0,
            processed_items: 0,
            logs: Vec::new(),
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to a new status, stamping `ended_at` on terminal states.
    pub fn transition_to(&mut self, status: JobStatus) {
        self.status = status;
        if status.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Append a log line, prefixed with the current wall-clock time.
    pub fn push_log(&mut self, message: &str) {
        self.logs
            .push(format!("[{}] {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), message));
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
