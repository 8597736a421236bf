use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_core::{Money, Transaction};
use thiserror::Error;
use tracing::{debug, info};

use crate::amount::{parse_amount, resolve_debit_credit, AmountCells, AmountParseError};
use crate::date::{DateOrder, DateParseError};
use crate::date_anchored::DateAnchored;
use crate::grid::{read_delimited, read_workbook, RawRow};
use crate::header_anchored::HeaderAnchored;
use crate::layout::{ColumnMap, LayoutError};

/// Input shapes the ingestor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileKind {
    /// Spreadsheet export; first worksheet.
    Xlsx,
    /// Comma-separated export.
    Csv,
    /// `|`-delimited text, typically PDF-to-text output.
    PipeText,
}

impl FileKind {
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit_once('.')?.1.to_lowercase();
        match ext.as_str() {
            "xlsx" | "xls" | "xlsm" | "ods" => Some(FileKind::Xlsx),
            "csv" => Some(FileKind::Csv),
            "txt" | "psv" => Some(FileKind::PipeText),
            _ => None,
        }
    }

    pub fn default_strategy(self) -> IngestStrategy {
        match self {
            FileKind::Xlsx => IngestStrategy::HeaderAnchored,
            FileKind::Csv | FileKind::PipeText => IngestStrategy::DateAnchored,
        }
    }

    pub fn read_rows(self, bytes: &[u8]) -> Result<Vec<RawRow>, IngestError> {
        Ok(match self {
            FileKind::Xlsx => read_workbook(bytes)?,
            FileKind::Csv => read_delimited(bytes, b',')?,
            FileKind::PipeText => read_delimited(bytes, b'|')?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestStrategy {
    HeaderAnchored,
    DateAnchored,
}

impl IngestStrategy {
    pub fn name(self) -> &'static str {
        match self {
            IngestStrategy::HeaderAnchored => "header-anchored",
            IngestStrategy::DateAnchored => "date-anchored",
        }
    }

    pub fn ingestor(self, columns: Option<ColumnMap>, date_order: DateOrder) -> Box<dyn TabularIngestor> {
        match self {
            IngestStrategy::HeaderAnchored => {
                Box::new(HeaderAnchored::new(columns).with_date_order(date_order))
            }
            IngestStrategy::DateAnchored => Box::new(DateAnchored::new(columns).with_date_order(date_order)),
        }
    }
}

/// The whole file is unusable under the chosen strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{strategy} ingestion failed: {reason}")]
pub struct IngestFormatError {
    pub strategy: &'static str,
    pub reason: String,
}

impl IngestFormatError {
    pub fn new(strategy: &'static str, reason: impl Into<String>) -> Self {
        Self { strategy, reason: reason.into() }
    }

    pub(crate) fn layout(strategy: &'static str, context: &str, err: LayoutError) -> Self {
        Self::new(strategy, format!("{context}: {err}"))
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Format(#[from] IngestFormatError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("spreadsheet error: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("input file has no rows")]
    Empty,
}

/// Why a physical row did not become (part of) a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "error", rename_all = "snake_case")]
pub enum RejectReason {
    Blank,
    /// Before the header row or the first dated row.
    Preamble,
    Header,
    RepeatedHeader,
    /// Summary text without a date ("Closing Balance", "Total").
    Footer,
    /// After a footer and before the next header or dated row.
    OutsideBlock,
    /// Undated text with no transaction to attach to.
    OrphanContinuation,
    /// Amounts present but the date cell is empty.
    MissingDate,
    /// Mapped columns are all empty.
    Unmapped,
    InvalidDate(DateParseError),
    InvalidAmount(AmountParseError),
}

impl RejectReason {
    /// A money-movement row lost to a date or amount it could not read.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            RejectReason::MissingDate | RejectReason::InvalidDate(_) | RejectReason::InvalidAmount(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRow {
    /// 1-based physical rows.
    pub rows: Vec<usize>,
    pub cells: Vec<String>,
    pub reason: RejectReason,
}

impl RejectedRow {
    pub(crate) fn single(row: &RawRow, reason: RejectReason) -> Self {
        Self { rows: vec![row.number], cells: row.cells.clone(), reason }
    }
}

pub(crate) fn reject(outcome: &mut ParseOutcome, row: &RawRow, reason: RejectReason) {
    push_rejected(outcome, RejectedRow::single(row, reason));
}

pub(crate) fn push_rejected(outcome: &mut ParseOutcome, rejected: RejectedRow) {
    debug!(rows = ?rejected.rows, reason = ?rejected.reason, "row rejected");
    outcome.rejected.push(rejected);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseOutcome {
    /// In input encounter order.
    pub transactions: Vec<Transaction>,
    pub rejected: Vec<RejectedRow>,
}

impl ParseOutcome {
    /// Physical rows covered by transactions and rejections together.
    pub fn accounted_rows(&self) -> usize {
        self.transactions.iter().map(|t| t.source_rows.len()).sum::<usize>()
            + self.rejected.iter().map(|r| r.rows.len()).sum::<usize>()
    }

    pub fn parse_failures(&self) -> usize {
        self.rejected.iter().filter(|r| r.reason.is_parse_failure()).count()
    }
}

/// One way of turning raw rows into ordered transactions.
pub trait TabularIngestor {
    fn name(&self) -> &'static str;

    fn parse(&self, rows: &[RawRow]) -> Result<ParseOutcome, IngestFormatError>;
}

/// Reads `bytes` as `kind` and runs the chosen (or the kind's default)
/// strategy. Caller-supplied columns replace header detection;
/// `date_order` settles ambiguous numeric dates.
pub fn ingest(
    bytes: &[u8],
    kind: FileKind,
    strategy: Option<IngestStrategy>,
    columns: Option<ColumnMap>,
    date_order: DateOrder,
) -> Result<ParseOutcome, IngestError> {
    let rows = kind.read_rows(bytes)?;
    if rows.is_empty() {
        return Err(IngestError::Empty);
    }
    let ingestor = strategy.unwrap_or_else(|| kind.default_strategy()).ingestor(columns, date_order);
    let outcome = ingestor.parse(&rows)?;
    info!(
        strategy = ingestor.name(),
        rows = rows.len(),
        transactions = outcome.transactions.len(),
        rejected = outcome.rejected.len(),
        parse_failures = outcome.parse_failures(),
        "statement ingested"
    );
    Ok(outcome)
}

/// Amount cells carried while a transaction is being assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OwnedCells {
    Combined { amount: String, indicator: Option<String> },
    Split { debit: String, credit: String },
}

impl OwnedCells {
    pub(crate) fn from_cells(cells: AmountCells<'_>) -> Self {
        match cells {
            AmountCells::Combined { amount, indicator } => OwnedCells::Combined {
                amount: amount.to_string(),
                indicator: indicator.map(str::to_string),
            },
            AmountCells::Split { debit, credit } => OwnedCells::Split {
                debit: debit.unwrap_or_default().to_string(),
                credit: credit.unwrap_or_default().to_string(),
            },
        }
    }

    pub(crate) fn as_cells(&self) -> AmountCells<'_> {
        match self {
            OwnedCells::Combined { amount, indicator } => AmountCells::Combined {
                amount,
                indicator: indicator.as_deref(),
            },
            OwnedCells::Split { debit, credit } => AmountCells::Split {
                debit: Some(debit),
                credit: Some(credit),
            },
        }
    }

    pub(crate) fn is_blank(&self) -> bool {
        self.as_cells().is_blank()
    }
}

/// Parses a passthrough balance cell. "CR"/"DR" suffixes give the sign of
/// the balance; an unreadable balance is dropped, never zeroed.
pub(crate) fn parse_balance(raw: Option<&str>) -> Option<Money> {
    let raw = raw?;
    match parse_amount(raw) {
        Ok(parsed) => Some(Money::from_decimal(parsed.value)),
        Err(err) => {
            debug!(raw, %err, "unreadable balance ignored");
            None
        }
    }
}

/// Draft of one transaction, possibly spanning several physical rows.
#[derive(Debug, Clone)]
pub(crate) struct Draft {
    pub date: NaiveDate,
    pub description: Vec<String>,
    pub amounts: OwnedCells,
    pub balance: Option<String>,
    pub rows: Vec<usize>,
    pub cells: Vec<String>,
    pub raw: Vec<String>,
}

impl Draft {
    pub(crate) fn start(row: &RawRow, date: NaiveDate, amounts: OwnedCells) -> Self {
        Self {
            date,
            description: Vec::new(),
            amounts,
            balance: None,
            rows: vec![row.number],
            cells: row.cells.clone(),
            raw: vec![row.joined()],
        }
    }

    pub(crate) fn absorb(&mut self, row: &RawRow) {
        self.rows.push(row.number);
        self.cells.extend(row.cells.iter().cloned());
        self.raw.push(row.joined());
    }

    pub(crate) fn push_description(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.description.push(text.to_string());
        }
    }

    /// Resolves the amounts. Rows that fail are rejected together.
    pub(crate) fn finish(self, sides: Option<(Money, Money)>) -> Result<Transaction, RejectedRow> {
        let reject = |reason| RejectedRow { rows: self.rows.clone(), cells: self.cells.clone(), reason };
        let (debit, credit) = match sides {
            Some(sides) => sides,
            None => resolve_debit_credit(self.amounts.as_cells())
                .map_err(|e| reject(RejectReason::InvalidAmount(e)))?,
        };
        let balance = parse_balance(self.balance.as_deref());
        let tx = Transaction::new(self.date, self.description.join(" "), debit, credit, balance)
            .map_err(|e| reject(RejectReason::InvalidAmount(AmountParseError::Invalid { raw: e.to_string() })))?;
        Ok(tx.with_rows(self.rows, self.raw.join(" | ")))
    }
}
