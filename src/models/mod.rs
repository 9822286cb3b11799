//! Data model types for stashscan

pub mod inventory_item;
pub mod processing_job;
pub mod recognition;

pub use inventory_item::{price_average, round2, Category, InventoryItem};
pub use processing_job::{JobKind, JobStatus, ProcessingJob};
pub use recognition::{ImageUpload, RecognizedItem};
