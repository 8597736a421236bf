use serde::Serialize;
use tally_classify::{BatchClassifier, ClassifyRequest, ItemOutcome};
use tally_core::{Categorization, Transaction};
use tally_import::CategoryRuleEngine;
use tokio::time::Instant;
use tracing::info;

pub const AI_DISABLED_NOTE: &str = "AI categorization disabled";
pub const NO_CLASSIFIER_NOTE: &str = "no categorization service configured";

/// How the categorizer decided, per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategorizeCounts {
    pub rules: usize,
    pub ai_confident: usize,
    pub flagged: usize,
    /// Balance-only rows left uncategorized.
    pub skipped: usize,
}

/// Drives each transaction from `Uncategorized` to exactly one decided
/// state: rules first, then the classifier for rule misses.
pub struct Categorizer<'a> {
    rules: &'a CategoryRuleEngine,
    classifier: Option<&'a BatchClassifier>,
    threshold: f32,
    use_ai: bool,
    deadline: Option<Instant>,
}

impl<'a> Categorizer<'a> {
    pub fn new(rules: &'a CategoryRuleEngine, threshold: f32) -> Self {
        Self { rules, classifier: None, threshold, use_ai: true, deadline: None }
    }

    pub fn with_classifier(mut self, classifier: Option<&'a BatchClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_ai(mut self, use_ai: bool) -> Self {
        self.use_ai = use_ai;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn categorize(&self, transactions: &mut [Transaction]) -> CategorizeCounts {
        let mut counts = CategorizeCounts::default();
        let mut misses = Vec::new();

        for (index, tx) in transactions.iter_mut().enumerate() {
            if !tx.is_money_movement() {
                counts.skipped += 1;
                continue;
            }
            match self.rules.find_matching_rule(tx) {
                Some(rule) => {
                    tx.apply(Categorization::RuleMatched {
                        category: rule.category.clone(),
                        subcategory: rule.subcategory.clone(),
                    });
                    counts.rules += 1;
                }
                None => misses.push(index),
            }
        }
        info!(matched = counts.rules, unmatched = misses.len(), "rules applied");

        if misses.is_empty() {
            return counts;
        }

        let classifier = match (self.use_ai, self.classifier) {
            (true, Some(classifier)) => classifier,
            (use_ai, _) => {
                let note = if use_ai { NO_CLASSIFIER_NOTE } else { AI_DISABLED_NOTE };
                for &index in &misses {
                    transactions[index].apply(Categorization::flagged(note));
                }
                counts.flagged += misses.len();
                return counts;
            }
        };

        let requests = misses
            .iter()
            .map(|&index| ClassifyRequest::from_transaction(index, &transactions[index]))
            .collect();
        let outcomes = classifier.classify_all(requests, self.deadline).await;

        for (&index, outcome) in misses.iter().zip(outcomes) {
            let decision = match outcome {
                ItemOutcome::Suggested(suggestion) => {
                    Categorization::from_suggestion(suggestion, self.threshold)
                }
                failed => Categorization::flagged(failed.note().unwrap_or_default()),
            };
            if matches!(decision, Categorization::AiConfident(_)) {
                counts.ai_confident += 1;
            } else {
                counts.flagged += 1;
            }
            transactions[index].apply(decision);
        }
        info!(
            ai_confident = counts.ai_confident,
            flagged = counts.flagged,
            threshold = self.threshold,
            "classifier results applied"
        );
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use tally_classify::{BatchConfig, MockClassifier, UNAVAILABLE_NOTE};
    use tally_core::{Money, Source};
    use tally_import::{CategoryRule, MatchType};

    fn tx(description: &str, debit: i64, credit: i64) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2023, 6, 5).unwrap();
        Transaction::new(
            date,
            description,
            Money::from_cents(debit),
            Money::from_cents(credit),
            Some(Money::from_cents(100_000)),
        )
        .unwrap()
    }

    fn rules() -> CategoryRuleEngine {
        CategoryRuleEngine::new(vec![CategoryRule::new(
            "swiggy",
            "SWIGGY",
            MatchType::Contains,
            "Food & Dining",
            "Food Delivery",
        )])
        .unwrap()
    }

    fn batch(mock: MockClassifier) -> BatchClassifier {
        BatchClassifier::new(Arc::new(mock), BatchConfig::default())
    }

    #[tokio::test]
    async fn rules_then_classifier() {
        let rules = rules();
        let classifier = batch(
            MockClassifier::new()
                .with_rule("uber", "Transport", "Cab/Taxi", 0.92)
                .with_rule("croma", "Shopping", "Electronics", 0.5),
        );
        let mut txs = vec![
            tx("SWIGGY ORDER 4521", 45_000, 0),
            tx("UBER TRIP", 30_000, 0),
            tx("POS CROMA", 199_900, 0),
            tx("Opening Balance", 0, 0),
        ];
        let counts = Categorizer::new(&rules, 0.8)
            .with_classifier(Some(&classifier))
            .categorize(&mut txs)
            .await;

        assert_eq!(counts, CategorizeCounts { rules: 1, ai_confident: 1, flagged: 1, skipped: 1 });
        assert_eq!(txs[0].source, Some(Source::Rules));
        assert_eq!(txs[0].confidence, 1.0);
        assert_eq!(txs[1].source, Some(Source::Haiku));
        assert_eq!(txs[1].subcategory.as_deref(), Some("Cab/Taxi"));
        assert_eq!(txs[2].source, Some(Source::Flagged));
        assert_eq!(txs[2].category, None);
        assert!(txs[2].notes.contains("Electronics"));
        assert_eq!(txs[3].source, None);
    }

    #[tokio::test]
    async fn ai_disabled_flags_misses_at_zero() {
        let rules = rules();
        let classifier = batch(MockClassifier::new().with_fallback("Other", "Misc", 0.99));
        let mut txs = vec![tx("SWIGGY", 100, 0), tx("UNKNOWN", 100, 0)];
        let counts = Categorizer::new(&rules, 0.8)
            .with_classifier(Some(&classifier))
            .with_ai(false)
            .categorize(&mut txs)
            .await;
        assert_eq!(counts.flagged, 1);
        assert_eq!(txs[1].source, Some(Source::Flagged));
        assert_eq!(txs[1].confidence, 0.0);
        assert_eq!(txs[1].notes, AI_DISABLED_NOTE);
    }

    #[tokio::test]
    async fn missing_classifier_flags_misses() {
        let rules = rules();
        let mut txs = vec![tx("UNKNOWN", 100, 0)];
        Categorizer::new(&rules, 0.8).categorize(&mut txs).await;
        assert_eq!(txs[0].notes, NO_CLASSIFIER_NOTE);
    }

    #[tokio::test(start_paused = true)]
    async fn service_failure_flags_with_reason() {
        let rules = rules();
        let classifier = batch(MockClassifier::new().failing_first(100));
        let mut txs = vec![tx("A", 100, 0), tx("SWIGGY", 100, 0), tx("B", 0, 100)];
        let counts = Categorizer::new(&rules, 0.8)
            .with_classifier(Some(&classifier))
            .categorize(&mut txs)
            .await;
        assert_eq!(counts.flagged, 2);
        for i in [0, 2] {
            assert_eq!(txs[i].source, Some(Source::Flagged));
            assert_eq!(txs[i].confidence, 0.0);
            assert_eq!(txs[i].notes, UNAVAILABLE_NOTE);
        }
        assert_eq!(txs[1].source, Some(Source::Rules));
    }
}
