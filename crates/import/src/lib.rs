#[macro_use]
mod util;

pub mod amount;
pub mod date;
pub mod date_anchored;
pub mod grid;
pub mod header_anchored;
pub mod ingest;
pub mod layout;
pub mod rules;

pub use amount::{parse_amount, resolve_debit_credit, AmountCells, AmountParseError, Marker, ParsedAmount};
pub use date::{parse_date, parse_date_with, DateOrder, DateParseError};
pub use date_anchored::DateAnchored;
pub use grid::RawRow;
pub use header_anchored::HeaderAnchored;
pub use ingest::{
    ingest, FileKind, IngestError, IngestFormatError, IngestStrategy, ParseOutcome, RejectReason,
    RejectedRow, TabularIngestor,
};
pub use layout::{ColumnMap, LayoutError};
pub use rules::{CategoryRule, CategoryRuleEngine, Direction, MatchType, RuleError};
