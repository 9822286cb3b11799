//! In-memory catalog cache
//!
//! Holds the market catalog keyed by normalized item name so recognition
//! output can be matched against it without further network traffic. The
//! whole map is replaced atomically on refresh; readers clone a cheap `Arc`
//! and never observe a half-built catalog.

use crate::services::market_client::CatalogEntry;
use crate::services::normalize::normalize_name;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name-keyed catalog lookup table
pub struct CatalogCache {
    entries: RwLock<Arc<HashMap<String, CatalogEntry>>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Replace the cache contents with a freshly fetched catalog.
    ///
    /// When two entries normalize to the same key the later one wins;
    /// vendor catalogs occasionally carry duplicate display names.
    pub async fn replace(&self, entries: Vec<CatalogEntry>) -> usize {
        let mut map = HashMap::with_capacity(entries.len());
        for entry in entries {
            map.insert(normalize_name(&entry.name), entry);
        }
        let count = map.len();

        *self.entries.write().await = Arc::new(map);

        count
    }

    /// Look up a catalog entry by display name (normalized internally).
    pub async fn lookup(&self, name: &str) -> Option<CatalogEntry> {
        let map = self.entries.read().await.clone();
        map.get(&normalize_name(name)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}
