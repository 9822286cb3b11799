//! Vision recognition client
//!
//! Sends screenshots to an OpenAI-compatible chat-completion endpoint and
//! parses the model's reply into `{name, quantity}` pairs. The prompt pins
//! the reply format to one `Name xQuantity` line per item; the parser is
//! tolerant of bullets, blank lines and a missing count.

use crate::models::{ImageUpload, RecognizedItem};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const REQUEST_TIMEOUT_SECS: u64 = 60;

const RECOGNITION_PROMPT: &str = "List every inventory item visible in this screenshot. \
Reply with one line per distinct item in the form: Name xQuantity \
(for example: Morphic Prism x3). Use the exact in-game item name. \
If the quantity is not visible, write x1. Output only the list, nothing else.";

/// Vision client errors
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Turns one screenshot into recognized items; the seam for a test fake.
#[async_trait]
pub trait ItemRecognizer: Send + Sync {
    async fn recognize(&self, image: &ImageUpload) -> Result<Vec<RecognizedItem>, VisionError>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// HTTP implementation of `ItemRecognizer`
pub struct HttpVisionClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpVisionClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| VisionError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ItemRecognizer for HttpVisionClient {
    async fn recognize(&self, image: &ImageUpload) -> Result<Vec<RecognizedItem>, VisionError> {
        let mime = infer::get(&image.bytes)
            .map(|t| t.mime_type())
            .unwrap_or("image/png");
        let data_url = format!("data:{};base64,{}", mime, BASE64.encode(&image.bytes));

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": RECOGNITION_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "max_tokens": 1024
        });

        tracing::debug!(file = %image.file_name, model = %self.model, "Sending image for recognition");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VisionError::Api(status.as_u16(), error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| VisionError::Parse("response contained no choices".to_string()))?;

        let items = parse_recognition_lines(content);

        tracing::debug!(file = %image.file_name, items = items.len(), "Recognition reply parsed");

        Ok(items)
    }
}

/// Parse `Name xQuantity` reply lines.
///
/// Blank lines and leading bullets are ignored; a line without a trailing
/// count token gets quantity 1; counts below 1 are clamped to 1.
pub fn parse_recognition_lines(text: &str) -> Vec<RecognizedItem> {
    let mut items = Vec::new();

    for raw in text.lines() {
        let line = raw.trim().trim_start_matches(['-', '*', '•']).trim();
        if line.is_empty() {
            continue;
        }

        let (name, quantity) = match line.rsplit_once(char::is_whitespace) {
            Some((head, tail)) if is_count_token(tail) => {
                (head.trim_end(), tail[1..].parse::<i64>().unwrap_or(1))
            }
            _ => (line, 1),
        };

        if name.is_empty() {
            continue;
        }

        items.push(RecognizedItem::new(name, quantity.max(1)));
    }

    items
}

/// True for `x` or `X` followed by one or more ASCII digits
fn is_count_token(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some('x') | Some('X')) && {
        let rest: Vec<char> = chars.collect();
        !rest.is_empty() && rest.iter().all(|c| c.is_ascii_digit())
    }
}
