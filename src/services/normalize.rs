//! Item name normalization
//!
//! One rule for the whole service: both catalog matching and merge identity
//! inside a session use `normalize_name`. The canonical form is lowercase,
//! edge-trimmed, with internal whitespace runs collapsed to one space and
//! colon spacing standardized to `": "`, so `"Name:Part"`, `"Name :  Part"`
//! and `"name: part"` all compare equal.

/// Canonicalize an item name for equality comparison.
///
/// Pure and total: always returns a string, empty in gives empty out.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let canonical = lowered
        .split(':')
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(": ");
    canonical.trim().to_string()
}
