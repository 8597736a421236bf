use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_core::Suggestion;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::backend::{ClassifierBackend, ClassifierError};
use crate::types::{ClassifyRequest, ClassifyResponseItem};

pub const UNAVAILABLE_NOTE: &str = "categorization service unavailable";
pub const MISSING_NOTE: &str = "missing from categorization response";
pub const TIMEOUT_NOTE: &str = "categorization timed out";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Transactions per service call.
    pub batch_size: usize,
    /// Calls per batch, first attempt included.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub initial_backoff_ms: u64,
    /// Batches in flight at once.
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_concurrency: 4,
        }
    }
}

impl BatchConfig {
    fn backoff(&self, retry: u32) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(2u64.saturating_pow(retry)))
    }
}

/// What the classifier produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Suggested(Suggestion),
    /// The batch failed after all attempts.
    Unavailable,
    /// The batch succeeded but this item was not in the response.
    Missing,
    /// The deadline passed before the batch finished.
    TimedOut,
}

impl ItemOutcome {
    pub fn note(&self) -> Option<&'static str> {
        match self {
            ItemOutcome::Suggested(_) => None,
            ItemOutcome::Unavailable => Some(UNAVAILABLE_NOTE),
            ItemOutcome::Missing => Some(MISSING_NOTE),
            ItemOutcome::TimedOut => Some(TIMEOUT_NOTE),
        }
    }
}

/// Splits requests into batches and sends them to the backend with
/// bounded concurrency, retrying transient failures with exponential
/// backoff. Every request gets exactly one outcome, in request order.
pub struct BatchClassifier {
    backend: Arc<dyn ClassifierBackend>,
    config: BatchConfig,
}

type BatchResult = (usize, Vec<ClassifyRequest>, Result<Vec<ClassifyResponseItem>, ClassifierError>);

impl BatchClassifier {
    pub fn new(backend: Arc<dyn ClassifierBackend>, config: BatchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Classifies all requests. On `deadline`, unfinished batches are
    /// abandoned and their items come back as [`ItemOutcome::TimedOut`].
    /// A batch whose task panics is reported as [`ItemOutcome::Unavailable`].
    pub async fn classify_all(&self, requests: Vec<ClassifyRequest>, deadline: Option<Instant>) -> Vec<ItemOutcome> {
        let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; requests.len()];
        if requests.is_empty() {
            return Vec::new();
        }

        let size = self.config.batch_size.max(1);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut set: JoinSet<BatchResult> = JoinSet::new();
        let mut spans: HashMap<task::Id, (usize, usize)> = HashMap::new();
        for (n, chunk) in requests.chunks(size).enumerate() {
            let batch = chunk.to_vec();
            let backend = Arc::clone(&self.backend);
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let len = batch.len();
            let handle = set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = classify_with_retry(backend.as_ref(), &batch, &config).await;
                (n * size, batch, result)
            });
            spans.insert(handle.id(), (n * size, len));
        }
        info!(
            backend = self.backend.name(),
            requests = requests.len(),
            batches = set.len(),
            "classifying unmatched transactions"
        );

        loop {
            let joined = match deadline {
                Some(at) => match tokio::time::timeout_at(at, set.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(abandoned = set.len(), "classifier deadline reached, abandoning batches");
                        set.abort_all();
                        break;
                    }
                },
                None => set.join_next().await,
            };
            let Some(joined) = joined else { break };
            let (start, batch, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    let Some(&(start, len)) = spans.get(&err.id()) else { continue };
                    warn!(start, size = len, %err, "classifier task failed, flagging");
                    for slot in &mut outcomes[start..start + len] {
                        *slot = Some(ItemOutcome::Unavailable);
                    }
                    continue;
                }
            };
            match result {
                Ok(items) => {
                    let assigned = assign(&batch, items);
                    let missing = assigned.iter().filter(|s| s.is_none()).count();
                    if missing > 0 {
                        warn!(start, missing, "classifier response incomplete");
                    }
                    for (offset, suggestion) in assigned.into_iter().enumerate() {
                        outcomes[start + offset] =
                            Some(suggestion.map_or(ItemOutcome::Missing, ItemOutcome::Suggested));
                    }
                }
                Err(err) => {
                    warn!(start, size = batch.len(), %err, "classifier batch failed, flagging");
                    for slot in &mut outcomes[start..start + batch.len()] {
                        *slot = Some(ItemOutcome::Unavailable);
                    }
                }
            }
        }

        outcomes
            .into_iter()
            .map(|o| o.unwrap_or(ItemOutcome::TimedOut))
            .collect()
    }
}

async fn classify_with_retry(
    backend: &dyn ClassifierBackend,
    batch: &[ClassifyRequest],
    config: &BatchConfig,
) -> Result<Vec<ClassifyResponseItem>, ClassifierError> {
    let attempts = config.max_attempts.max(1);
    let mut retry = 0;
    loop {
        match backend.classify(batch).await {
            Ok(items) => return Ok(items),
            Err(err) if err.is_transient() && retry + 1 < attempts => {
                let delay = config.backoff(retry);
                warn!(
                    attempt = retry + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    %err,
                    "classifier call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Matches response items to the batch by echoed id, falling back to
/// array position for items without one. The first item for a slot wins.
pub fn assign(batch: &[ClassifyRequest], items: Vec<ClassifyResponseItem>) -> Vec<Option<Suggestion>> {
    let by_id: HashMap<usize, usize> = batch.iter().enumerate().map(|(i, r)| (r.id, i)).collect();
    let mut slots: Vec<Option<Suggestion>> = vec![None; batch.len()];
    for (position, item) in items.into_iter().enumerate() {
        let slot = match item.id {
            Some(id) => by_id.get(&id).copied(),
            None => (position < batch.len()).then_some(position),
        };
        if let Some(slot) = slot {
            if slots[slot].is_none() {
                slots[slot] = Some(item.into_suggestion());
            }
        }
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockClassifier;
    use tally_core::Money;

    fn requests(descriptions: &[&str]) -> Vec<ClassifyRequest> {
        descriptions
            .iter()
            .enumerate()
            .map(|(id, d)| ClassifyRequest {
                id: id * 10,
                description: d.to_string(),
                debit: Money::from_cents(100),
                credit: Money::zero(),
            })
            .collect()
    }

    fn config(batch_size: usize) -> BatchConfig {
        BatchConfig { batch_size, ..BatchConfig::default() }
    }

    fn categories(outcomes: &[ItemOutcome]) -> Vec<String> {
        outcomes
            .iter()
            .map(|o| match o {
                ItemOutcome::Suggested(s) => s.subcategory.clone(),
                other => other.note().unwrap_or_default().to_string(),
            })
            .collect()
    }

    // ── assign ────────────────────────────────────────────────────────────────

    #[test]
    fn assign_by_id_in_any_order() {
        let batch = requests(&["A", "B", "C"]);
        let items = vec![
            ClassifyResponseItem::new(20, "X", "c", 0.9),
            ClassifyResponseItem::new(0, "X", "a", 0.9),
        ];
        let slots = assign(&batch, items);
        assert_eq!(slots[0].as_ref().unwrap().subcategory, "a");
        assert!(slots[1].is_none());
        assert_eq!(slots[2].as_ref().unwrap().subcategory, "c");
    }

    #[test]
    fn assign_falls_back_to_position_and_ignores_unknown_ids() {
        let batch = requests(&["A", "B"]);
        let mut positional = ClassifyResponseItem::new(0, "X", "first", 0.5);
        positional.id = None;
        let items = vec![positional, ClassifyResponseItem::new(999, "X", "stray", 0.5)];
        let slots = assign(&batch, items);
        assert_eq!(slots[0].as_ref().unwrap().subcategory, "first");
        assert!(slots[1].is_none());
    }

    // ── dispatch ──────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn results_come_back_in_request_order() {
        let mock = Arc::new(
            MockClassifier::new()
                .with_rule("swiggy", "Food & Dining", "Food Delivery", 0.9)
                .with_rule("uber", "Transport", "Cab/Taxi", 0.85),
        );
        let classifier = BatchClassifier::new(mock.clone(), config(2));
        let outcomes = classifier
            .classify_all(requests(&["SWIGGY", "UBER", "MISC", "SWIGGY 2", "UBER 2"]), None)
            .await;
        assert_eq!(
            categories(&outcomes),
            ["Food Delivery", "Cab/Taxi", "Uncategorized", "Food Delivery", "Cab/Taxi"]
        );
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_retry_with_backoff() {
        let mock = Arc::new(MockClassifier::new().failing_first(2));
        let classifier = BatchClassifier::new(mock.clone(), config(10));
        let started = Instant::now();
        let outcomes = classifier.classify_all(requests(&["A"]), None).await;
        assert!(matches!(outcomes[0], ItemOutcome::Suggested(_)));
        assert_eq!(mock.calls(), 3);
        assert!(started.elapsed() >= Duration::from_millis(500 + 1000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_flag_the_batch() {
        let mock = Arc::new(MockClassifier::new().failing_first(10));
        let classifier = BatchClassifier::new(mock.clone(), config(10));
        let outcomes = classifier.classify_all(requests(&["A", "B", "C"]), None).await;
        assert!(outcomes.iter().all(|o| *o == ItemOutcome::Unavailable));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_isolated_to_its_batch() {
        let mock = Arc::new(MockClassifier::new().failing_when("broken"));
        let classifier = BatchClassifier::new(mock, config(3));
        let outcomes = classifier
            .classify_all(requests(&["A", "B", "C", "BROKEN", "E", "F", "G"]), None)
            .await;
        assert_eq!(
            categories(&outcomes),
            [
                "Uncategorized",
                "Uncategorized",
                "Uncategorized",
                UNAVAILABLE_NOTE,
                UNAVAILABLE_NOTE,
                UNAVAILABLE_NOTE,
                "Uncategorized",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let mock = Arc::new(MockClassifier::new().failing_first(1).with_failure_status(400));
        let classifier = BatchClassifier::new(mock.clone(), config(10));
        let outcomes = classifier.classify_all(requests(&["A"]), None).await;
        assert_eq!(outcomes, [ItemOutcome::Unavailable]);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn short_response_marks_items_missing() {
        let mock = Arc::new(MockClassifier::new().dropping_last(1));
        let classifier = BatchClassifier::new(mock, config(2));
        let outcomes = classifier.classify_all(requests(&["A", "B", "C"]), None).await;
        assert_eq!(categories(&outcomes), ["Uncategorized", MISSING_NOTE, MISSING_NOTE]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_abandons_slow_batches() {
        let mock = Arc::new(MockClassifier::new().with_latency(Duration::from_secs(30)));
        let classifier = BatchClassifier::new(mock, config(2));
        let deadline = Instant::now() + Duration::from_secs(5);
        let outcomes = classifier.classify_all(requests(&["A", "B", "C"]), Some(deadline)).await;
        assert!(outcomes.iter().all(|o| *o == ItemOutcome::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_batch_is_unavailable_not_timed_out() {
        let mock = Arc::new(MockClassifier::new().panicking_when("crash"));
        let classifier = BatchClassifier::new(mock, config(2));
        let outcomes = classifier.classify_all(requests(&["A", "B", "CRASH", "D", "E"]), None).await;
        assert_eq!(
            categories(&outcomes),
            ["Uncategorized", "Uncategorized", UNAVAILABLE_NOTE, UNAVAILABLE_NOTE, "Uncategorized"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panic_and_deadline_are_told_apart() {
        let mock = Arc::new(
            MockClassifier::new()
                .panicking_when("crash")
                .slow_when("slow", Duration::from_secs(30)),
        );
        let classifier = BatchClassifier::new(mock, config(1));
        let deadline = Instant::now() + Duration::from_secs(5);
        let outcomes = classifier.classify_all(requests(&["CRASH", "SLOW", "C"]), Some(deadline)).await;
        assert_eq!(
            outcomes,
            [
                ItemOutcome::Unavailable,
                ItemOutcome::TimedOut,
                ItemOutcome::Suggested(Suggestion::new("Other", "Uncategorized", 0.3)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let mock = Arc::new(MockClassifier::new().with_latency(Duration::from_millis(100)));
        let classifier = BatchClassifier::new(
            mock.clone(),
            BatchConfig { batch_size: 1, max_concurrency: 2, ..BatchConfig::default() },
        );
        let outcomes = classifier.classify_all(requests(&["A", "B", "C", "D", "E", "F"]), None).await;
        assert_eq!(outcomes.len(), 6);
        assert_eq!(mock.calls(), 6);
        assert!(mock.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let mock = Arc::new(MockClassifier::new());
        let classifier = BatchClassifier::new(mock.clone(), BatchConfig::default());
        assert!(classifier.classify_all(Vec::new(), None).await.is_empty());
        assert_eq!(mock.calls(), 0);
    }
}
