//! Market price API client
//!
//! Two upstream calls: a bulk catalog fetch (`GET {api_url}/catalog`) used to
//! build the name → identifier cache, and a per-item order-book snapshot
//! (`GET {api_url}/items/{id}/orders`). Both are rate limited to stay inside
//! the vendor's published request ceiling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("stashscan/", env!("CARGO_PKG_VERSION"));
const RATE_LIMIT_MS: u64 = 334; // 3 requests per second
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Market client errors
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One catalog entry: market identifier plus localized display name
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
}

/// Order-book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Sell,
    Buy,
}

/// One current order-book entry (a snapshot, not history)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketOrder {
    pub kind: OrderKind,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    items: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    orders: Vec<MarketOrder>,
}

/// Source of market data; the seam that lets tests substitute a fake.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Full set of catalog entries for the cache.
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, MarketError>;

    /// Current order-book snapshot for one catalog identifier.
    async fn fetch_orders(&self, market_id: &str) -> Result<Vec<MarketOrder>, MarketError>;
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Market rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// HTTP implementation of `MarketDataSource`
pub struct HttpMarketClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    api_url: String,
}

impl HttpMarketClient {
    pub fn new(api_url: impl Into<String>) -> Result<Self, MarketError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| MarketError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, MarketError> {
        self.rate_limiter.wait().await;

        tracing::debug!(url = %url, "Querying market API");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MarketError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| MarketError::Parse(e.to_string()))
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketClient {
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, MarketError> {
        let url = format!("{}/catalog", self.api_url);
        let response: CatalogResponse = self.get_json(&url).await?;

        tracing::info!(entries = response.items.len(), "Fetched market catalog");

        Ok(response.items)
    }

    async fn fetch_orders(&self, market_id: &str) -> Result<Vec<MarketOrder>, MarketError> {
        let url = format!("{}/items/{}/orders", self.api_url, market_id);
        let response: OrdersResponse = self.get_json(&url).await?;

        tracing::debug!(
            market_id = %market_id,
            orders = response.orders.len(),
            "Fetched order book"
        );

        Ok(response.orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let client = HttpMarketClient::new("https://market.example/api/v1/");
        assert!(client.is_ok());
        // Trailing slash is stripped so URL building stays clean
        assert_eq!(client.unwrap().api_url, "https://market.example/api/v1");
    }

    #[test]
    fn order_kind_parses_lowercase() {
        let order: MarketOrder = serde_json::from_str(r#"{"kind":"sell","price":12.5}"#).unwrap();
        assert_eq!(order.kind, OrderKind::Sell);
        assert_eq!(order.price, 12.5);
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(50);

        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        let elapsed = start.elapsed();

        assert!(
            elapsed >= Duration::from_millis(50),
            "Second request should wait out the interval, elapsed {:?}",
            elapsed
        );
    }
}
