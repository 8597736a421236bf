use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{ClassifierBackend, ClassifierError};
use crate::taxonomy;
use crate::types::{ClassifyRequest, ClassifyResponseItem};

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
pub const DEFAULT_MAX_TOKENS: u32 = 2048;
const API_VERSION: &str = "2023-06-01";
const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Classifier backed by the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClassifier {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    endpoint: String,
}

impl AnthropicClassifier {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    /// Reads the key from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ClassifierError> {
        Self::from_api_key(std::env::var(API_KEY_VAR).ok())
    }

    pub fn from_api_key(api_key: Option<String>) -> Result<Self, ClassifierError> {
        match api_key.map(|k| k.trim().to_string()) {
            Some(key) if !key.is_empty() => Ok(Self::new(key)),
            _ => Err(ClassifierError::MissingApiKey),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn headers(&self) -> Result<HeaderMap, ClassifierError> {
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| ClassifierError::MissingApiKey)?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Msg<'a>>,
}

#[derive(Deserialize)]
struct Resp {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    t: String,
    text: Option<String>,
}

#[async_trait]
impl ClassifierBackend for AnthropicClassifier {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn classify(&self, batch: &[ClassifyRequest]) -> Result<Vec<ClassifyResponseItem>, ClassifierError> {
        let prompt = build_prompt(batch);
        let body = Req {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Msg { role: "user", content: &prompt }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifierError::Status { status: status.as_u16(), body });
        }

        let out: Resp = resp.json().await?;
        let text: String = out
            .content
            .into_iter()
            .filter(|b| b.t == "text")
            .filter_map(|b| b.text)
            .collect();
        debug!(model = %self.model, batch = batch.len(), chars = text.len(), "classifier response received");
        parse_response(&text)
    }
}

/// Prompt asking for one JSON object per transaction, keyed by `id`.
pub fn build_prompt(batch: &[ClassifyRequest]) -> String {
    let lines = batch
        .iter()
        .map(|r| {
            let (kind, amount) = if r.debit.is_positive() {
                ("expense/debit", r.debit)
            } else {
                ("income/credit", r.credit)
            };
            format!("{} | {} | {} | {}", r.id, r.description.replace('\n', " "), kind, amount)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Categorize each of these bank transactions into one of the given categories.

Transactions (id | description | type | amount):
{lines}

Available categories:
{categories}

Respond with ONLY a JSON array containing one object per transaction, in this exact format:
[{{\"id\": 0, \"category\": \"CategoryName\", \"subcategory\": \"SubcategoryName\", \"confidence\": 0.85}}]

Rules:
- copy each transaction's id unchanged
- confidence must be between 0.0 and 1.0
- use lower confidence (0.5-0.7) if the description is ambiguous
- use higher confidence (0.8-0.95) if you are reasonably certain
- if you cannot determine the category, use \"Other\" > \"Uncategorized\" with low confidence
- match the category and subcategory names EXACTLY as listed above",
        categories = taxonomy::prompt_listing(),
    )
}

/// Extracts suggestions from the model's text. Prose around the JSON is
/// ignored, a lone object is accepted as a one-element array, and
/// elements that cannot be read are skipped (the caller flags them as
/// missing).
pub fn parse_response(text: &str) -> Result<Vec<ClassifyResponseItem>, ClassifierError> {
    let json = json_span(text, '[', ']')
        .or_else(|| json_span(text, '{', '}'))
        .ok_or_else(|| ClassifierError::Malformed(snippet(text)))?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| ClassifierError::Malformed(format!("{e}: {}", snippet(text))))?;
    let items = match &value {
        Value::Array(values) => values.iter().filter_map(ClassifyResponseItem::from_json).collect(),
        Value::Object(_) => ClassifyResponseItem::from_json(&value).into_iter().collect(),
        _ => return Err(ClassifierError::Malformed(snippet(text))),
    };
    Ok(items)
}

fn json_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn snippet(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Money;

    fn request(id: usize, description: &str, debit: i64, credit: i64) -> ClassifyRequest {
        ClassifyRequest {
            id,
            description: description.to_string(),
            debit: Money::from_cents(debit),
            credit: Money::from_cents(credit),
        }
    }

    // ── prompt ────────────────────────────────────────────────────────────────

    #[test]
    fn prompt_lists_transactions_and_taxonomy() {
        let prompt = build_prompt(&[
            request(4, "POS 1234 CROMA", 199_900, 0),
            request(9, "NEFT CR ACME", 0, 500_000),
        ]);
        assert!(prompt.contains("4 | POS 1234 CROMA | expense/debit | 1999.00"));
        assert!(prompt.contains("9 | NEFT CR ACME | income/credit | 5000.00"));
        assert!(prompt.contains("- Food & Dining: Restaurant, Food Delivery"));
        assert!(prompt.contains("JSON array"));
    }

    // ── parse_response ────────────────────────────────────────────────────────

    #[test]
    fn parses_array_inside_prose() {
        let text = r#"Here you go:
[{"id": 1, "category": "Shopping", "subcategory": "Electronics", "confidence": 0.91},
 {"id": 2, "category": "Income", "subcategory": "Salary"}]
Let me know if you need more."#;
        let items = parse_response(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, Some(1));
        assert_eq!(items[1].confidence, None);
        assert_eq!(items[1].clone().into_suggestion().confidence, 0.0);
    }

    #[test]
    fn single_object_is_accepted() {
        let items = parse_response(r#"{"category": "Other", "subcategory": "Uncategorized", "confidence": 1.4}"#)
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].clone().into_suggestion().confidence, 1.0);
    }

    #[test]
    fn unreadable_elements_are_skipped() {
        let items = parse_response(r#"[{"id": 0, "category": "Cash"}, "oops", {"id": 2}]"#).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn no_json_is_malformed() {
        assert!(matches!(parse_response("I cannot help with that."), Err(ClassifierError::Malformed(_))));
        assert!(matches!(parse_response("[not json]"), Err(ClassifierError::Malformed(_))));
    }

    // ── configuration ─────────────────────────────────────────────────────────

    #[test]
    fn api_key_is_required() {
        assert!(matches!(AnthropicClassifier::from_api_key(None), Err(ClassifierError::MissingApiKey)));
        assert!(matches!(
            AnthropicClassifier::from_api_key(Some("  ".into())),
            Err(ClassifierError::MissingApiKey)
        ));
        let c = AnthropicClassifier::from_api_key(Some("sk-test".into()))
            .unwrap()
            .with_model("claude-3-5-haiku-20241022");
        assert_eq!(c.model(), "claude-3-5-haiku-20241022");
        assert_eq!(c.name(), "anthropic");
    }
}
