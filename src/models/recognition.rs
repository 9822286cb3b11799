//! Types shared between the vision client and the ingestion pipeline

/// One uploaded screenshot, validated (type, size) at the API boundary
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// One `{name, quantity}` pair recognized in a screenshot
///
/// Names are kept exactly as the recognizer produced them; normalization
/// only happens later, when reconciling against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedItem {
    pub name: String,
    pub quantity: i64,
}

impl RecognizedItem {
    pub fn new(name: impl Into<String>, quantity: i64) -> Self {
        Self {
            name: name.into(),
            quantity,
        }
    }
}
