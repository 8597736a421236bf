use serde::Serialize;
use serde_json::Value;
use tally_core::{Money, Suggestion, Transaction};

/// One unmatched transaction sent to the classifier. `id` is the
/// transaction's position and is echoed back by the service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyRequest {
    pub id: usize,
    pub description: String,
    pub debit: Money,
    pub credit: Money,
}

impl ClassifyRequest {
    pub fn from_transaction(id: usize, tx: &Transaction) -> Self {
        Self {
            id,
            description: tx.description.clone(),
            debit: tx.debit,
            credit: tx.credit,
        }
    }
}

/// A single suggestion as returned by the service, before clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyResponseItem {
    pub id: Option<usize>,
    pub category: String,
    pub subcategory: String,
    /// Absent in the response means no confidence at all.
    pub confidence: Option<f32>,
}

impl ClassifyResponseItem {
    pub fn new(id: usize, category: &str, subcategory: &str, confidence: f32) -> Self {
        Self {
            id: Some(id),
            category: category.to_string(),
            subcategory: subcategory.to_string(),
            confidence: Some(confidence),
        }
    }

    /// Lenient read of one JSON element. Numbers given as strings are
    /// accepted; an element without a category is unusable.
    pub fn from_json(value: &Value) -> Option<Self> {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(|s| s.trim().to_string());
        let number = |key: &str| match value.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        let category = text("category").filter(|c| !c.is_empty())?;
        Some(Self {
            id: number("id").filter(|n| *n >= 0.0).map(|n| n as usize),
            category,
            subcategory: text("subcategory").unwrap_or_default(),
            confidence: number("confidence").map(|c| c as f32),
        })
    }

    /// Missing confidence reads as 0.0; out-of-range values are clamped.
    pub fn into_suggestion(self) -> Suggestion {
        Suggestion::new(self.category, self.subcategory, self.confidence.unwrap_or(0.0))
    }
}
