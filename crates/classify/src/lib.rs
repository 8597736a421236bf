//! Categorization of transactions the rule engine could not match, through
//! an external classifier called in bounded, retried batches.

pub mod anthropic;
pub mod backend;
pub mod batch;
pub mod taxonomy;
pub mod types;

pub use anthropic::AnthropicClassifier;
pub use backend::{ClassifierBackend, ClassifierError, MockClassifier};
pub use batch::{BatchClassifier, BatchConfig, ItemOutcome, MISSING_NOTE, TIMEOUT_NOTE, UNAVAILABLE_NOTE};
pub use types::{ClassifyRequest, ClassifyResponseItem};
