use serde::Serialize;
use std::collections::BTreeMap;

use crate::money::Money;
use crate::period::{DateRange, Month};
use crate::transaction::{Source, Transaction};

/// Category label used for aggregates of flagged (uncategorized) rows.
pub const REVIEW_CATEGORY: &str = "Review Required";
pub const REVIEW_SUBCATEGORY: &str = "Manual Review Needed";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub subcategory: String,
    pub count: usize,
    pub debits: Money,
    pub credits: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthTotal {
    pub month: Month,
    pub count: usize,
    pub debits: Money,
    pub credits: Money,
    pub net: Money,
}

/// Aggregates over a finished transaction sequence. Built once by
/// [`Statistics::compute`] and never updated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub rules_matched: usize,
    pub haiku_matched: usize,
    pub flagged: usize,
    /// Balance-only rows that carried no money movement.
    pub informational: usize,
    pub total_debits: Money,
    pub total_credits: Money,
    pub net_flow: Money,
    pub date_range: Option<DateRange>,
    pub by_category: Vec<CategoryTotal>,
    pub by_month: Vec<MonthTotal>,
}

impl Statistics {
    pub fn compute(transactions: &[Transaction]) -> Self {
        let count_source =
            |s: Source| transactions.iter().filter(|t| t.source == Some(s)).count();

        let total_debits: Money = transactions.iter().map(|t| t.debit).sum();
        let total_credits: Money = transactions.iter().map(|t| t.credit).sum();

        let mut categories: BTreeMap<(String, String), CategoryTotal> = BTreeMap::new();
        let mut months: BTreeMap<Month, MonthTotal> = BTreeMap::new();

        for tx in transactions.iter().filter(|t| t.is_money_movement()) {
            let category = tx.category.clone().unwrap_or_else(|| REVIEW_CATEGORY.to_string());
            let subcategory = tx
                .subcategory
                .clone()
                .unwrap_or_else(|| REVIEW_SUBCATEGORY.to_string());
            let entry = categories
                .entry((category.clone(), subcategory.clone()))
                .or_insert_with(|| CategoryTotal {
                    category,
                    subcategory,
                    count: 0,
                    debits: Money::zero(),
                    credits: Money::zero(),
                });
            entry.count += 1;
            entry.debits += tx.debit;
            entry.credits += tx.credit;

            let month = Month::of(tx.date);
            let m = months.entry(month).or_insert_with(|| MonthTotal {
                month,
                count: 0,
                debits: Money::zero(),
                credits: Money::zero(),
                net: Money::zero(),
            });
            m.count += 1;
            m.debits += tx.debit;
            m.credits += tx.credit;
            m.net = m.credits - m.debits;
        }

        Statistics {
            total: transactions.len(),
            rules_matched: count_source(Source::Rules),
            haiku_matched: count_source(Source::Haiku),
            flagged: count_source(Source::Flagged),
            informational: transactions.iter().filter(|t| !t.is_money_movement()).count(),
            total_debits,
            total_credits,
            net_flow: total_credits - total_debits,
            date_range: DateRange::covering(transactions.iter().map(|t| t.date)),
            by_category: categories.into_values().collect(),
            by_month: months.into_values().collect(),
        }
    }
}
