//! Statement processing entry point: ingestion, rule and AI categorization,
//! statistics and the upload summary.

pub mod config;
pub mod orchestrator;
pub mod process;
pub mod summary;
pub mod telemetry;

pub use config::{ClassifierConfig, ConfigError, PipelineConfig};
pub use orchestrator::{CategorizeCounts, Categorizer};
pub use process::{Pipeline, PipelineError, ProcessOptions, ProcessOutput};
pub use summary::{PreviewRow, Summary, SummaryStatistics};
pub use telemetry::init_tracing;
