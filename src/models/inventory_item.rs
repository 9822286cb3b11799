//! Inventory item record
//!
//! Items are scoped to a session key; identity for merge purposes is the
//! normalized display name (see `services::normalize`). An item with no
//! market match still exists with empty price lists and `None` market
//! fields; the spreadsheet sentinel strings never appear in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One inventory record within a session scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Unique within the session scope
    pub id: Uuid,

    /// Display name as recognized or imported (source of truth for identity)
    pub name: String,

    /// Owned quantity, never negative
    pub quantity: i64,

    /// Current sell-order price observations, order preserved
    pub sell_prices: Vec<f64>,

    /// Current buy-order price observations, order preserved
    pub buy_prices: Vec<f64>,

    /// Mean of `sell_prices` rounded to 2 decimals, 0.0 when empty
    pub avg_sell: f64,

    /// Mean of `buy_prices` rounded to 2 decimals, 0.0 when empty
    pub avg_buy: f64,

    /// Market catalog identifier, `None` when no catalog match
    pub market_id: Option<String>,

    /// Deep link to the market page, `None` when no catalog match
    pub market_url: Option<String>,

    pub category: Category,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Item category, derived purely from the display name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Display name carries the `[Set]` marker
    Set,
    /// Any other recognized item
    Item,
    /// Fallback for records written before the field existed
    #[serde(other)]
    Unknown,
}

impl Category {
    /// Tag a display name by the bracketed-marker convention.
    pub fn from_name(name: &str) -> Self {
        if name.to_lowercase().contains("[set]") {
            Category::Set
        } else {
            Category::Item
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Set => "set",
            Category::Item => "item",
            Category::Unknown => "unknown",
        }
    }

    /// Parse the stored text form; anything unrecognized maps to `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "set" => Category::Set,
            "item" => Category::Item,
            _ => Category::Unknown,
        }
    }
}

/// Round to 2 decimal places, the precision used for all price averages.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Arithmetic mean of a price list, 0.0 for an empty list.
pub fn price_average(prices: &[f64]) -> f64 {
    if prices.is_empty() {
        return 0.0;
    }
    let sum: f64 = prices.iter().sum();
    round2(sum / prices.len() as f64)
}
