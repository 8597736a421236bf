pub mod money;
pub mod period;
pub mod reconcile;
pub mod stats;
pub mod transaction;

pub use money::Money;
pub use period::{DateRange, Month};
pub use reconcile::{reconcile, BalanceMismatch, ReconciliationReport};
pub use stats::{CategoryTotal, MonthTotal, Statistics, REVIEW_CATEGORY, REVIEW_SUBCATEGORY};
pub use transaction::{
    normalize_description, Categorization, Source, Suggestion, Transaction, TransactionError,
    RULE_CONFIDENCE,
};
