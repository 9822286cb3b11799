//! Database access for stashscan
//!
//! One SQLite database holds every session's inventory rows, keyed by
//! `(session_key, id)`; sessions never see each other's rows. Job state
//! is not persisted: jobs live and die with the process (see
//! `services::jobs`).

pub mod items;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create the stashscan tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS inventory_items (
            session_key TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 1,
            sell_prices TEXT NOT NULL DEFAULT '[]',
            buy_prices TEXT NOT NULL DEFAULT '[]',
            avg_sell REAL NOT NULL DEFAULT 0.0,
            avg_buy REAL NOT NULL DEFAULT 0.0,
            market_id TEXT,
            market_url TEXT,
            category TEXT NOT NULL DEFAULT 'unknown',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (session_key, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Lookup path for merge identity. Non-unique: the store does not
    // enforce name uniqueness, the merge step does
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_inventory_items_normalized_name
        ON inventory_items(session_key, normalized_name)
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (inventory_items)");

    Ok(())
}
