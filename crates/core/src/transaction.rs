use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::money::Money;

/// Confidence attached to every deterministic rule match.
pub const RULE_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransactionError {
    #[error("Negative amount in {0} slot: {1}")]
    NegativeAmount(&'static str, Money),
    #[error("Both debit ({0}) and credit ({1}) are positive")]
    BothSides(Money, Money),
}

/// Which stage of the categorizer produced the final decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Rules,
    Haiku,
    Flagged,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Rules => write!(f, "rules"),
            Source::Haiku => write!(f, "haiku"),
            Source::Flagged => write!(f, "flagged"),
        }
    }
}

impl std::str::FromStr for Source {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rules" => Ok(Source::Rules),
            "haiku" => Ok(Source::Haiku),
            "flagged" => Ok(Source::Flagged),
            other => Err(format!("Unknown categorization source: '{other}'")),
        }
    }
}

/// A category proposal from the external classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub category: String,
    pub subcategory: String,
    /// Service-reported confidence, clamped to 0.0–1.0.
    pub confidence: f32,
}

impl Suggestion {
    pub fn new(category: impl Into<String>, subcategory: impl Into<String>, confidence: f32) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
            confidence: clamp_confidence(confidence),
        }
    }
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} > {} (confidence {:.2})",
            self.category, self.subcategory, self.confidence
        )
    }
}

fn clamp_confidence(c: f32) -> f32 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

/// Terminal and initial states of the per-transaction categorization machine.
///
/// `RuleMiss` and `AIAttempted` are transient and never stored; a transaction
/// moves from `Uncategorized` straight to one of the three decided states.
#[derive(Debug, Clone, PartialEq)]
pub enum Categorization {
    Uncategorized,
    RuleMatched {
        category: String,
        subcategory: String,
    },
    AiConfident(Suggestion),
    AiLowConfidence {
        suggestion: Option<Suggestion>,
        confidence: f32,
        notes: String,
    },
}

impl Categorization {
    /// Applies the confidence threshold. The boundary is inclusive.
    pub fn from_suggestion(suggestion: Suggestion, threshold: f32) -> Self {
        if suggestion.confidence >= threshold {
            Categorization::AiConfident(suggestion)
        } else {
            Categorization::AiLowConfidence {
                confidence: suggestion.confidence,
                notes: suggestion.to_string(),
                suggestion: Some(suggestion),
            }
        }
    }

    /// Flagged without any usable suggestion (service failure, AI disabled, timeout).
    pub fn flagged(notes: impl Into<String>) -> Self {
        Categorization::AiLowConfidence {
            suggestion: None,
            confidence: 0.0,
            notes: notes.into(),
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            Categorization::Uncategorized => None,
            Categorization::RuleMatched { .. } => Some(Source::Rules),
            Categorization::AiConfident(_) => Some(Source::Haiku),
            Categorization::AiLowConfidence { .. } => Some(Source::Flagged),
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Categorization::Uncategorized => 0.0,
            Categorization::RuleMatched { .. } => RULE_CONFIDENCE,
            Categorization::AiConfident(s) => s.confidence,
            Categorization::AiLowConfidence { confidence, .. } => *confidence,
        }
    }
}

/// A normalized statement row. Identity is positional: the index in the
/// ingested sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    /// Display text with the statement's original casing.
    pub description: String,
    pub debit: Money,
    pub credit: Money,
    pub balance: Option<Money>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub confidence: f32,
    pub source: Option<Source>,
    /// The classifier's suggestion or failure reason when flagged.
    pub notes: String,
    /// 1-based physical rows this transaction was assembled from.
    pub source_rows: Vec<usize>,
    pub raw_text: String,
}

impl Transaction {
    /// Builds an uncategorized transaction, enforcing that at most one of
    /// debit/credit is positive and neither is negative.
    pub fn new(
        date: NaiveDate,
        description: impl Into<String>,
        debit: Money,
        credit: Money,
        balance: Option<Money>,
    ) -> Result<Self, TransactionError> {
        if debit.is_negative() {
            return Err(TransactionError::NegativeAmount("debit", debit));
        }
        if credit.is_negative() {
            return Err(TransactionError::NegativeAmount("credit", credit));
        }
        if debit.is_positive() && credit.is_positive() {
            return Err(TransactionError::BothSides(debit, credit));
        }
        Ok(Transaction {
            date,
            description: description.into(),
            debit,
            credit,
            balance,
            category: None,
            subcategory: None,
            confidence: 0.0,
            source: None,
            notes: String::new(),
            source_rows: Vec::new(),
            raw_text: String::new(),
        })
    }

    pub fn with_rows(mut self, rows: Vec<usize>, raw_text: impl Into<String>) -> Self {
        self.source_rows = rows;
        self.raw_text = raw_text.into();
        self
    }

    /// False for balance-only / informational rows, which skip categorization.
    pub fn is_money_movement(&self) -> bool {
        self.debit.is_positive() || self.credit.is_positive()
    }

    pub fn is_debit(&self) -> bool {
        self.debit.is_positive()
    }

    /// Signed flow: credits positive, debits negative.
    pub fn amount(&self) -> Money {
        self.credit - self.debit
    }

    /// Lower-cased, whitespace-collapsed description used for rule matching.
    pub fn match_text(&self) -> String {
        normalize_description(&self.description)
    }

    pub fn is_categorized(&self) -> bool {
        self.source.is_some()
    }

    /// Records the categorizer's decision. Called once per transaction.
    pub fn apply(&mut self, decision: Categorization) {
        debug_assert!(!self.is_categorized(), "transaction categorized twice");
        self.source = decision.source();
        self.confidence = decision.confidence();
        match decision {
            Categorization::Uncategorized => {}
            Categorization::RuleMatched { category, subcategory } => {
                self.category = Some(category);
                self.subcategory = Some(subcategory);
                self.notes.clear();
            }
            Categorization::AiConfident(s) => {
                self.category = Some(s.category);
                self.subcategory = Some(s.subcategory);
                self.notes.clear();
            }
            Categorization::AiLowConfidence { notes, .. } => {
                self.category = None;
                self.subcategory = None;
                self.notes = notes;
            }
        }
    }
}

pub fn normalize_description(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
