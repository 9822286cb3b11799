//! stashscan - screenshot-driven game inventory service
//!
//! Default port: 7751. All state except the inventory database lives in
//! memory; jobs and split outputs do not survive a restart.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use stashscan::config::Config;
use stashscan::services::enrichment::MarketEnrichment;
use stashscan::services::market_client::HttpMarketClient;
use stashscan::services::vision_client::{HttpVisionClient, ItemRecognizer};
use stashscan::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    info!("Starting stashscan");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("Failed to load configuration")?;

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = stashscan::db::init_database_pool(&db_path)
        .await
        .context("Failed to initialize database")?;
    info!("Database connection established");

    let market = Arc::new(
        HttpMarketClient::new(&config.market.api_url)
            .context("Failed to build market client")?,
    );
    let enrichment = Arc::new(MarketEnrichment::new(market, &config.market.web_url));

    // Warm the catalog cache; a failure degrades price enrichment but the
    // service still starts
    match enrichment.refresh_catalog().await {
        Ok(entries) => info!(entries, "Market catalog loaded"),
        Err(e) => warn!(error = %e, "Market catalog unavailable, starting with an empty cache"),
    }

    let recognizer: Option<Arc<dyn ItemRecognizer>> = match &config.vision.api_key {
        Some(key) if !key.is_empty() => {
            let client =
                HttpVisionClient::new(&config.vision.api_url, key, &config.vision.model)
                    .context("Failed to build vision client")?;
            info!(model = %config.vision.model, "Vision recognition enabled");
            Some(Arc::new(client))
        }
        _ => {
            warn!("No vision API key configured; screenshot analysis will answer 503");
            None
        }
    };

    let state = AppState::new(db_pool, enrichment, recognizer);
    let app = stashscan::build_router(state);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
