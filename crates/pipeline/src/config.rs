use std::time::Duration;

use serde::{Deserialize, Serialize};
use tally_classify::anthropic::{DEFAULT_ENDPOINT, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use tally_classify::{AnthropicClassifier, BatchConfig, ClassifierError};
use tally_import::DateOrder;
use thiserror::Error;

pub const THRESHOLD_VAR: &str = "TALLY_CONFIDENCE_THRESHOLD";
pub const USE_AI_VAR: &str = "TALLY_USE_AI";
pub const TIMEOUT_VAR: &str = "TALLY_TIMEOUT_SECS";
pub const DATE_ORDER_VAR: &str = "TALLY_DATE_ORDER";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("confidence threshold must be within 0.0..=1.0, got {0}")]
    InvalidThreshold(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// AI suggestions at or above this confidence are accepted.
    pub confidence_threshold: f32,
    pub use_ai: bool,
    /// Overall deadline for the AI stage.
    pub timeout_secs: Option<u64>,
    /// Transactions included in the summary preview.
    pub preview_limit: usize,
    /// How ambiguous numeric dates are read: "dmy", "mdy" or "ymd".
    pub date_order: DateOrder,
    pub classifier: ClassifierConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.8,
            use_ai: true,
            timeout_secs: None,
            preview_limit: 50,
            date_order: DateOrder::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model: String,
    pub max_tokens: u32,
    pub endpoint: String,
    #[serde(flatten)]
    pub batch: BatchConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            batch: BatchConfig::default(),
        }
    }
}

impl ClassifierConfig {
    /// HTTP classifier configured from this table; the key comes from the environment.
    pub fn anthropic(&self) -> Result<AnthropicClassifier, ClassifierError> {
        Ok(AnthropicClassifier::from_env()?
            .with_model(&self.model)
            .with_max_tokens(self.max_tokens)
            .with_endpoint(&self.endpoint))
    }
}

impl PipelineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays `TALLY_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|var| std::env::var(var).ok())
    }

    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(THRESHOLD_VAR) {
            self.confidence_threshold = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { var: THRESHOLD_VAR, value })?;
        }
        if let Some(value) = lookup(USE_AI_VAR) {
            self.use_ai = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::Env { var: USE_AI_VAR, value }),
            };
        }
        if let Some(value) = lookup(TIMEOUT_VAR) {
            self.timeout_secs = match value.trim() {
                "" => None,
                text => Some(
                    text.parse()
                        .map_err(|_| ConfigError::Env { var: TIMEOUT_VAR, value: value.clone() })?,
                ),
            };
        }
        if let Some(value) = lookup(DATE_ORDER_VAR) {
            self.date_order = value
                .parse()
                .map_err(|_| ConfigError::Env { var: DATE_ORDER_VAR, value: value.clone() })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_threshold(self.confidence_threshold)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

pub(crate) fn validate_threshold(threshold: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold(threshold))
    }
}
