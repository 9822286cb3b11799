//! Service layer: normalization, market data, vision recognition, jobs,
//! spreadsheet handling and the ingestion pipeline that ties them together.

pub mod catalog;
pub mod enrichment;
pub mod jobs;
pub mod market_client;
pub mod normalize;
pub mod pipeline;
pub mod spreadsheet;
pub mod vision_client;
