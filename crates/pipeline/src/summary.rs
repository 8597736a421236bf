use chrono::NaiveDate;
use serde::Serialize;
use tally_core::{DateRange, Money, Source, Statistics, Transaction};

/// Headline figures of the upload response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub total: usize,
    pub rules_matched: usize,
    pub haiku_matched: usize,
    pub flagged: usize,
    pub total_debits: Money,
    pub total_credits: Money,
    pub net_flow: Money,
    pub date_range: Option<DateRange>,
}

impl From<&Statistics> for SummaryStatistics {
    fn from(stats: &Statistics) -> Self {
        Self {
            total: stats.total,
            rules_matched: stats.rules_matched,
            haiku_matched: stats.haiku_matched,
            flagged: stats.flagged,
            total_debits: stats.total_debits,
            total_credits: stats.total_credits,
            net_flow: stats.net_flow,
            date_range: stats.date_range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewRow {
    pub date: NaiveDate,
    pub description: String,
    pub debit: Money,
    pub credit: Money,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub source: Option<Source>,
    pub confidence: f32,
}

impl From<&Transaction> for PreviewRow {
    fn from(tx: &Transaction) -> Self {
        Self {
            date: tx.date,
            description: tx.description.clone(),
            debit: tx.debit,
            credit: tx.credit,
            category: tx.category.clone(),
            subcategory: tx.subcategory.clone(),
            source: tx.source,
            confidence: tx.confidence,
        }
    }
}

/// JSON body handed back to the uploader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub statistics: SummaryStatistics,
    pub preview: Vec<PreviewRow>,
    /// Rows that looked like money movement but could not be read.
    pub parse_failures: usize,
}

impl Summary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
