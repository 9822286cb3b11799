//! CSV spreadsheet bridge
//!
//! The one place that knows the 8-column sheet layout and its sentinel
//! conventions (`not found`, `none`, `n/a`). Everything past this boundary
//! works with real `Option`s and empty lists.

use crate::db::items::NewItem;
use crate::error::{Error, Result};
use crate::models::{Category, InventoryItem};

pub const HEADERS: [&str; 8] = [
    "Item Name",
    "Quantity",
    "Market ID",
    "Sell Prices",
    "Buy Prices",
    "Avg Sell",
    "Avg Buy",
    "Market URL",
];

/// Quantity at or below this routes a split row to the `low` output
pub const SPLIT_THRESHOLD: i64 = 10;

const MISSING_ID: &str = "not found";
const EMPTY_PRICES: &str = "none";
const MISSING_URL: &str = "n/a";

/// One parsed data row
#[derive(Debug, Clone)]
pub struct SheetRow {
    pub name: String,
    pub quantity: i64,
    pub market_id: Option<String>,
    pub sell_prices: Vec<f64>,
    pub buy_prices: Vec<f64>,
    pub avg_sell: f64,
    pub avg_buy: f64,
    pub market_url: Option<String>,
}

impl SheetRow {
    /// Convert to a store insert, re-deriving the category from the name.
    pub fn into_new_item(self) -> NewItem {
        NewItem {
            category: Category::from_name(&self.name),
            name: self.name,
            quantity: self.quantity,
            sell_prices: self.sell_prices,
            buy_prices: self.buy_prices,
            avg_sell: self.avg_sell,
            avg_buy: self.avg_buy,
            market_id: self.market_id,
            market_url: self.market_url,
        }
    }
}

/// Both halves of a price-threshold split, kept as ready-to-download CSV
#[derive(Debug, Clone)]
pub struct SplitOutputs {
    pub low: String,
    pub high: String,
    pub low_rows: usize,
    pub high_rows: usize,
}

fn format_price(value: f64) -> String {
    format!("{:.2}", value)
}

fn format_prices(prices: &[f64]) -> String {
    if prices.is_empty() {
        EMPTY_PRICES.to_string()
    } else {
        prices
            .iter()
            .map(|p| format_price(*p))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Render a session's items as CSV, one row per item in the given order.
pub fn export_csv(items: &[InventoryItem]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(HEADERS)
        .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;

    for item in items {
        writer
            .write_record([
                item.name.as_str(),
                &item.quantity.to_string(),
                item.market_id.as_deref().unwrap_or(MISSING_ID),
                &format_prices(&item.sell_prices),
                &format_prices(&item.buy_prices),
                &format_price(item.avg_sell),
                &format_price(item.avg_buy),
                item.market_url.as_deref().unwrap_or(MISSING_URL),
            ])
            .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV was not UTF-8: {}", e)))
}

fn parse_price_list(cell: &str, row: usize, column: &str) -> Result<Vec<f64>> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case(EMPTY_PRICES) {
        return Ok(Vec::new());
    }

    cell.split(',')
        .map(|part| {
            part.trim().parse::<f64>().map_err(|_| {
                Error::InvalidInput(format!(
                    "row {}: unparseable price {:?} in {}",
                    row, part, column
                ))
            })
        })
        .collect()
}

fn parse_avg(cell: &str, row: usize, column: &str) -> Result<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case(EMPTY_PRICES) {
        return Ok(0.0);
    }
    cell.parse::<f64>().map_err(|_| {
        Error::InvalidInput(format!(
            "row {}: unparseable average {:?} in {}",
            row, cell, column
        ))
    })
}

/// Parse an uploaded sheet into rows.
///
/// The header row is skipped; sentinel cells map back to `None`/empty.
/// Any malformed row rejects the whole file so a bad import can never stay
/// half-applied.
pub fn parse_csv(data: &[u8]) -> Result<Vec<SheetRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);

    let mut rows = Vec::new();

    for (index, record) in reader.records().enumerate() {
        // Data rows are 1-based in error messages; the header is row 0
        let row_number = index + 1;
        let record =
            record.map_err(|e| Error::InvalidInput(format!("row {}: {}", row_number, e)))?;

        if record.len() != HEADERS.len() {
            return Err(Error::InvalidInput(format!(
                "row {}: expected {} columns, got {}",
                row_number,
                HEADERS.len(),
                record.len()
            )));
        }

        let name = record[0].trim().to_string();
        if name.is_empty() {
            return Err(Error::InvalidInput(format!(
                "row {}: item name is empty",
                row_number
            )));
        }

        let quantity = record[1].trim().parse::<i64>().map_err(|_| {
            Error::InvalidInput(format!(
                "row {}: unparseable quantity {:?}",
                row_number,
                record[1].trim()
            ))
        })?;
        if quantity < 0 {
            return Err(Error::InvalidInput(format!(
                "row {}: quantity must be non-negative, got {}",
                row_number, quantity
            )));
        }

        let market_id = match record[2].trim() {
            cell if cell.is_empty() || cell.eq_ignore_ascii_case(MISSING_ID) => None,
            cell => Some(cell.to_string()),
        };
        let market_url = match record[7].trim() {
            cell if cell.is_empty() || cell.eq_ignore_ascii_case(MISSING_URL) => None,
            cell => Some(cell.to_string()),
        };

        rows.push(SheetRow {
            name,
            quantity,
            market_id,
            sell_prices: parse_price_list(&record[3], row_number, "Sell Prices")?,
            buy_prices: parse_price_list(&record[4], row_number, "Buy Prices")?,
            avg_sell: parse_avg(&record[5], row_number, "Avg Sell")?,
            avg_buy: parse_avg(&record[6], row_number, "Avg Buy")?,
            market_url,
        });
    }

    Ok(rows)
}

/// Leading run of ASCII digits in a quantity cell, 0 when there is none.
fn leading_int(cell: &str) -> i64 {
    let digits: String = cell
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i64>().unwrap_or(0)
}

/// Partition a raw sheet by the quantity column.
///
/// Rows pass through untouched; only the quantity cell's leading integer is
/// inspected, so a sheet too dirty to import can still be split. Both
/// outputs carry the header row.
pub fn split_by_quantity(data: &[u8]) -> Result<SplitOutputs> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut low = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let mut high = csv::WriterBuilder::new().flexible(true).from_writer(Vec::new());
    let mut low_rows = 0usize;
    let mut high_rows = 0usize;

    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| Error::InvalidInput(format!("row {}: {}", index, e)))?;

        if index == 0 {
            low.write_record(&record)
                .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
            high.write_record(&record)
                .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
            continue;
        }

        let quantity = leading_int(record.get(1).unwrap_or(""));
        if quantity <= SPLIT_THRESHOLD {
            low.write_record(&record)
                .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
            low_rows += 1;
        } else {
            high.write_record(&record)
                .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
            high_rows += 1;
        }
    }

    let into_string = |writer: csv::Writer<Vec<u8>>| -> Result<String> {
        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| Error::Internal(format!("CSV was not UTF-8: {}", e)))
    };

    Ok(SplitOutputs {
        low: into_string(low)?,
        high: into_string(high)?,
        low_rows,
        high_rows,
    })
}
