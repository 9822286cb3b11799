//! Inventory store operations
//!
//! Every operation is scoped by the caller's session key; no call can see or
//! touch another session's rows. Single-statement mutations are atomic at
//! SQLite granularity; read-modify-write cycles are serialized one level up
//! by the pipeline's per-session lock.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Category, InventoryItem};
use crate::services::normalize::normalize_name;

/// Field set for creating a new item
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub quantity: i64,
    pub sell_prices: Vec<f64>,
    pub buy_prices: Vec<f64>,
    pub avg_sell: f64,
    pub avg_buy: f64,
    pub market_id: Option<String>,
    pub market_url: Option<String>,
    pub category: Category,
}

impl NewItem {
    /// Defaults per the store contract: quantity 1, empty price lists,
    /// zero averages, no market match.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let category = Category::from_name(&name);
        Self {
            name,
            quantity: 1,
            sell_prices: Vec::new(),
            buy_prices: Vec::new(),
            avg_sell: 0.0,
            avg_buy: 0.0,
            market_id: None,
            market_url: None,
            category,
        }
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }
}

/// List a session's items in insertion order.
pub async fn list(pool: &SqlitePool, session: &str) -> Result<Vec<InventoryItem>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, quantity, sell_prices, buy_prices, avg_sell, avg_buy,
               market_id, market_url, category, created_at, updated_at
        FROM inventory_items
        WHERE session_key = ?
        ORDER BY rowid
        "#,
    )
    .bind(session)
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

/// Fetch one item by id, `None` when absent in that session.
pub async fn get(pool: &SqlitePool, session: &str, id: Uuid) -> Result<Option<InventoryItem>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, quantity, sell_prices, buy_prices, avg_sell, avg_buy,
               market_id, market_url, category, created_at, updated_at
        FROM inventory_items
        WHERE session_key = ? AND id = ?
        "#,
    )
    .bind(session)
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(item_from_row).transpose()
}

/// Insert a new item with a fresh id.
pub async fn create(pool: &SqlitePool, session: &str, new: NewItem) -> Result<InventoryItem> {
    if new.quantity < 0 {
        return Err(Error::InvalidInput(format!(
            "quantity must be non-negative, got {}",
            new.quantity
        )));
    }

    let now = Utc::now();
    let item = InventoryItem {
        id: Uuid::new_v4(),
        name: new.name,
        quantity: new.quantity,
        sell_prices: new.sell_prices,
        buy_prices: new.buy_prices,
        avg_sell: new.avg_sell,
        avg_buy: new.avg_buy,
        market_id: new.market_id,
        market_url: new.market_url,
        category: new.category,
        created_at: now,
        updated_at: now,
    };

    let sell_prices = serde_json::to_string(&item.sell_prices)
        .map_err(|e| Error::Internal(format!("Failed to serialize sell prices: {}", e)))?;
    let buy_prices = serde_json::to_string(&item.buy_prices)
        .map_err(|e| Error::Internal(format!("Failed to serialize buy prices: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO inventory_items (
            session_key, id, name, normalized_name, quantity,
            sell_prices, buy_prices, avg_sell, avg_buy,
            market_id, market_url, category, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(session)
    .bind(item.id.to_string())
    .bind(&item.name)
    .bind(normalize_name(&item.name))
    .bind(item.quantity)
    .bind(&sell_prices)
    .bind(&buy_prices)
    .bind(item.avg_sell)
    .bind(item.avg_buy)
    .bind(&item.market_id)
    .bind(&item.market_url)
    .bind(item.category.as_str())
    .bind(item.created_at.to_rfc3339())
    .bind(item.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(item)
}

/// Set an item's quantity. Negative values are rejected here as well as at
/// the API boundary; an unknown id is a NotFound error.
pub async fn update_quantity(
    pool: &SqlitePool,
    session: &str,
    id: Uuid,
    quantity: i64,
) -> Result<InventoryItem> {
    if quantity < 0 {
        return Err(Error::InvalidInput(format!(
            "quantity must be non-negative, got {}",
            quantity
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE inventory_items
        SET quantity = ?, updated_at = ?
        WHERE session_key = ? AND id = ?
        "#,
    )
    .bind(quantity)
    .bind(Utc::now().to_rfc3339())
    .bind(session)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Inventory item not found: {}", id)));
    }

    get(pool, session, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Item vanished after update: {}", id)))
}

/// Delete an item. No-op when already absent (idempotent).
pub async fn delete(pool: &SqlitePool, session: &str, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM inventory_items WHERE session_key = ? AND id = ?")
        .bind(session)
        .bind(id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

/// Find an item by normalized display name; first match in insertion order.
pub async fn find_by_name(
    pool: &SqlitePool,
    session: &str,
    name: &str,
) -> Result<Option<InventoryItem>> {
    let row = sqlx::query(
        r#"
        SELECT id, name, quantity, sell_prices, buy_prices, avg_sell, avg_buy,
               market_id, market_url, category, created_at, updated_at
        FROM inventory_items
        WHERE session_key = ? AND normalized_name = ?
        ORDER BY rowid
        LIMIT 1
        "#,
    )
    .bind(session)
    .bind(normalize_name(name))
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(item_from_row).transpose()
}

/// Remove all records for one session. Returns the number removed.
pub async fn clear(pool: &SqlitePool, session: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM inventory_items WHERE session_key = ?")
        .bind(session)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Count a session's records.
pub async fn count(pool: &SqlitePool, session: &str) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM inventory_items WHERE session_key = ?")
            .bind(session)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

fn item_from_row(row: &SqliteRow) -> Result<InventoryItem> {
    let id: String = row.get("id");
    let id = Uuid::parse_str(&id)
        .map_err(|e| Error::Internal(format!("Failed to parse item id: {}", e)))?;

    let sell_prices: String = row.get("sell_prices");
    let sell_prices: Vec<f64> = serde_json::from_str(&sell_prices)
        .map_err(|e| Error::Internal(format!("Failed to deserialize sell prices: {}", e)))?;

    let buy_prices: String = row.get("buy_prices");
    let buy_prices: Vec<f64> = serde_json::from_str(&buy_prices)
        .map_err(|e| Error::Internal(format!("Failed to deserialize buy prices: {}", e)))?;

    let category: String = row.get("category");

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let updated_at: String = row.get("updated_at");
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| Error::Internal(format!("Failed to parse updated_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    Ok(InventoryItem {
        id,
        name: row.get("name"),
        quantity: row.get("quantity"),
        sell_prices,
        buy_prices,
        avg_sell: row.get("avg_sell"),
        avg_buy: row.get("avg_buy"),
        market_id: row.get("market_id"),
        market_url: row.get("market_url"),
        category: Category::parse(&category),
        created_at,
        updated_at,
    })
}
