use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tally_classify::{BatchClassifier, BatchConfig, ClassifierBackend, ClassifierError};
use tally_core::{reconcile, Money, ReconciliationReport, Statistics, Transaction};
use tally_import::{
    ingest, CategoryRuleEngine, ColumnMap, DateOrder, FileKind, IngestError, IngestStrategy, RejectedRow,
    RuleError,
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{validate_threshold, ConfigError, PipelineConfig};
use crate::orchestrator::{CategorizeCounts, Categorizer};
use crate::summary::{PreviewRow, Summary, SummaryStatistics};

/// Running-balance drift tolerated before a row is reported.
const RECONCILE_TOLERANCE_CENTS: i64 = 1;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("confidence threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(f32),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("rule configuration error: {0}")]
    Rules(#[from] RuleError),
}

/// Per-run knobs. `Default` matches [`PipelineConfig::default`].
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Replaces header detection entirely when set.
    pub column_overrides: Option<ColumnMap>,
    /// Replaces the file kind's default strategy when set.
    pub strategy: Option<IngestStrategy>,
    pub date_order: DateOrder,
    pub confidence_threshold: f32,
    pub use_ai: bool,
    /// Deadline for the AI stage, measured from the start of the run.
    pub timeout: Option<Duration>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl ProcessOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            column_overrides: None,
            strategy: None,
            date_order: config.date_order,
            confidence_threshold: config.confidence_threshold,
            use_ai: config.use_ai,
            timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutput {
    /// In input row order.
    pub transactions: Vec<Transaction>,
    pub statistics: Statistics,
    pub rejected: Vec<RejectedRow>,
    pub reconciliation: ReconciliationReport,
}

impl ProcessOutput {
    /// Upload response with the first `limit` transactions as preview.
    pub fn summary(&self, limit: usize) -> Summary {
        Summary {
            statistics: SummaryStatistics::from(&self.statistics),
            preview: self.transactions.iter().take(limit).map(PreviewRow::from).collect(),
            parse_failures: self.rejected.iter().filter(|r| r.reason.is_parse_failure()).count(),
        }
    }
}

/// Ingest → rules → classifier → statistics, for one statement file.
pub struct Pipeline {
    rules: CategoryRuleEngine,
    classifier: Option<BatchClassifier>,
}

impl Pipeline {
    pub fn new(rules: CategoryRuleEngine) -> Self {
        Self { rules, classifier: None }
    }

    pub fn with_classifier(mut self, backend: Arc<dyn ClassifierBackend>, config: BatchConfig) -> Self {
        self.classifier = Some(BatchClassifier::new(backend, config));
        self
    }

    /// Builtin rules plus the HTTP classifier when AI is enabled. A missing
    /// API key leaves the pipeline rules-only; misses are then flagged.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let pipeline = Self::new(CategoryRuleEngine::builtin()?);
        if !config.use_ai {
            return Ok(pipeline);
        }
        match config.classifier.anthropic() {
            Ok(backend) => Ok(pipeline.with_classifier(Arc::new(backend), config.classifier.batch.clone())),
            Err(ClassifierError::MissingApiKey) => {
                warn!("ANTHROPIC_API_KEY not set, running rules only");
                Ok(pipeline)
            }
            Err(err) => {
                warn!(%err, "classifier unavailable, running rules only");
                Ok(pipeline)
            }
        }
    }

    pub fn rules(&self) -> &CategoryRuleEngine {
        &self.rules
    }

    pub async fn process(
        &self,
        bytes: &[u8],
        kind: FileKind,
        options: ProcessOptions,
    ) -> Result<ProcessOutput, PipelineError> {
        if validate_threshold(options.confidence_threshold).is_err() {
            return Err(PipelineError::InvalidThreshold(options.confidence_threshold));
        }
        let deadline = options.timeout.map(|t| Instant::now() + t);

        // 1. Normalize rows into transactions.
        let outcome = ingest(bytes, kind, options.strategy, options.column_overrides, options.date_order)?;
        let mut transactions = outcome.transactions;

        // 2. Rules, then the classifier for rule misses.
        let counts: CategorizeCounts = Categorizer::new(&self.rules, options.confidence_threshold)
            .with_classifier(self.classifier.as_ref())
            .with_ai(options.use_ai)
            .with_deadline(deadline)
            .categorize(&mut transactions)
            .await;

        // 3. Aggregates and balance check over the finished sequence.
        let statistics = Statistics::compute(&transactions);
        let reconciliation = reconcile(&transactions, Money::from_cents(RECONCILE_TOLERANCE_CENTS));
        if !reconciliation.is_clean() {
            warn!(
                mismatches = reconciliation.mismatches.len(),
                checked = reconciliation.checked,
                "running balance does not match statement"
            );
        }

        info!(
            transactions = statistics.total,
            rules = counts.rules,
            haiku = counts.ai_confident,
            flagged = counts.flagged,
            informational = counts.skipped,
            rejected = outcome.rejected.len(),
            "statement processed"
        );

        Ok(ProcessOutput {
            transactions,
            statistics,
            rejected: outcome.rejected,
            reconciliation,
        })
    }
}
