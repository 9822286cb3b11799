//! Market enrichment
//!
//! Bridges recognized item names to market data: catalog match, order-book
//! fetch, price averaging, deep-link URL. Lookup is infallible: a miss or
//! an upstream error comes back as `None`, and the pipeline stores the
//! item without market data.

use crate::models::{price_average, round2};
use crate::services::catalog::CatalogCache;
use crate::services::market_client::{MarketDataSource, MarketError, OrderKind};
use std::sync::Arc;

/// Market data attached to an inventory item on creation
#[derive(Debug, Clone)]
pub struct MarketInfo {
    pub market_id: String,
    pub market_url: String,
    pub sell_prices: Vec<f64>,
    pub buy_prices: Vec<f64>,
    pub avg_sell: f64,
    pub avg_buy: f64,
}

/// Catalog cache plus order-book source, injected into the pipeline
pub struct MarketEnrichment {
    catalog: CatalogCache,
    source: Arc<dyn MarketDataSource>,
    web_url: String,
}

impl MarketEnrichment {
    pub fn new(source: Arc<dyn MarketDataSource>, web_url: impl Into<String>) -> Self {
        Self {
            catalog: CatalogCache::new(),
            source,
            web_url: web_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Re-fetch the catalog and swap it into the cache.
    ///
    /// On failure the previous cache contents stay in place.
    pub async fn refresh_catalog(&self) -> Result<usize, MarketError> {
        let entries = self.source.fetch_catalog().await?;
        Ok(self.catalog.replace(entries).await)
    }

    pub async fn catalog_len(&self) -> usize {
        self.catalog.len().await
    }

    /// Match a display name against the catalog and fetch its order book.
    ///
    /// `None` means the item is unknown to the market or its order fetch
    /// failed; the caller stores it without market data either way.
    pub async fn lookup(&self, name: &str) -> Option<MarketInfo> {
        let entry = self.catalog.lookup(name).await?;

        let orders = match self.source.fetch_orders(&entry.id).await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!(
                    item = %name,
                    market_id = %entry.id,
                    error = %e,
                    "Order fetch failed, storing item without prices"
                );
                return None;
            }
        };

        let mut sell_prices = Vec::new();
        let mut buy_prices = Vec::new();
        for order in orders {
            match order.kind {
                OrderKind::Sell => sell_prices.push(round2(order.price)),
                OrderKind::Buy => buy_prices.push(round2(order.price)),
            }
        }

        Some(MarketInfo {
            market_url: format!("{}/items/{}", self.web_url, entry.id),
            avg_sell: price_average(&sell_prices),
            avg_buy: price_average(&buy_prices),
            sell_prices,
            buy_prices,
            market_id: entry.id,
        })
    }
}
