use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tally_core::Suggestion;
use thiserror::Error;

use crate::types::{ClassifyRequest, ClassifyResponseItem};

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("ANTHROPIC_API_KEY is not set")]
    MissingApiKey,
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("categorization service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed categorization response: {0}")]
    Malformed(String),
}

impl ClassifierError {
    /// Transport failures, rate limiting and server errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            ClassifierError::Transport(_) => true,
            ClassifierError::Status { status, .. } => *status == 429 || *status >= 500,
            ClassifierError::MissingApiKey | ClassifierError::Malformed(_) => false,
        }
    }
}

/// Abstraction over the external categorization service. One call handles
/// one batch; results may come back in any order and may be incomplete.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn classify(&self, batch: &[ClassifyRequest]) -> Result<Vec<ClassifyResponseItem>, ClassifierError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Deterministic classifier: the first keyword contained in a description
/// decides the suggestion. Failures, latency and short responses can be
/// scripted to exercise the batch dispatcher.
pub struct MockClassifier {
    table: Vec<(String, Suggestion)>,
    fallback: Suggestion,
    fail_first: AtomicUsize,
    fail_when: Option<String>,
    panic_when: Option<String>,
    slow_when: Option<(String, Duration)>,
    failure_status: u16,
    latency: Option<Duration>,
    drop_last: usize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            table: Vec::new(),
            fallback: Suggestion::new("Other", "Uncategorized", 0.3),
            fail_first: AtomicUsize::new(0),
            fail_when: None,
            panic_when: None,
            slow_when: None,
            failure_status: 503,
            latency: None,
            drop_last: 0,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_rule(mut self, keyword: &str, category: &str, subcategory: &str, confidence: f32) -> Self {
        self.table
            .push((keyword.to_lowercase(), Suggestion::new(category, subcategory, confidence)));
        self
    }

    pub fn with_fallback(mut self, category: &str, subcategory: &str, confidence: f32) -> Self {
        self.fallback = Suggestion::new(category, subcategory, confidence);
        self
    }

    /// The first `n` calls fail with the failure status.
    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::SeqCst);
        self
    }

    /// Every batch containing `keyword` fails.
    pub fn failing_when(mut self, keyword: &str) -> Self {
        self.fail_when = Some(keyword.to_lowercase());
        self
    }

    /// Panics on any batch containing `keyword`.
    pub fn panicking_when(mut self, keyword: &str) -> Self {
        self.panic_when = Some(keyword.to_lowercase());
        self
    }

    /// Adds `latency` to any batch containing `keyword`.
    pub fn slow_when(mut self, keyword: &str, latency: Duration) -> Self {
        self.slow_when = Some((keyword.to_lowercase(), latency));
        self
    }

    pub fn with_failure_status(mut self, status: u16) -> Self {
        self.failure_status = status;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Omits the last `n` results of every response.
    pub fn dropping_last(mut self, n: usize) -> Self {
        self.drop_last = n;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn suggest(&self, description: &str) -> &Suggestion {
        let text = description.to_lowercase();
        self.table
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map_or(&self.fallback, |(_, s)| s)
    }

    fn mentions(batch: &[ClassifyRequest], keyword: &str) -> bool {
        batch.iter().any(|r| r.description.to_lowercase().contains(keyword))
    }

    fn should_fail(&self, batch: &[ClassifyRequest]) -> bool {
        let scripted = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let keyword = self.fail_when.as_deref().is_some_and(|k| Self::mentions(batch, k));
        scripted || keyword
    }
}

#[async_trait]
impl ClassifierBackend for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, batch: &[ClassifyRequest]) -> Result<Vec<ClassifyResponseItem>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some((_, latency)) = self.slow_when.as_ref().filter(|(k, _)| Self::mentions(batch, k)) {
            tokio::time::sleep(*latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.panic_when.as_deref().is_some_and(|k| Self::mentions(batch, k)) {
            panic!("scripted panic");
        }

        if self.should_fail(batch) {
            return Err(ClassifierError::Status {
                status: self.failure_status,
                body: "scripted failure".to_string(),
            });
        }
        let keep = batch.len().saturating_sub(self.drop_last);
        Ok(batch
            .iter()
            .take(keep)
            .map(|r| {
                let s = self.suggest(&r.description);
                ClassifyResponseItem::new(r.id, &s.category, &s.subcategory, s.confidence)
            })
            .collect())
    }
}
