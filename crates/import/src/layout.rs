use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::amount::AmountCells;
use crate::date::parse_date;
use crate::grid::RawRow;
use crate::util::contains_keyword;

pub const DATE_KEYWORDS: &[&str] = &[
    "date", "txn date", "transaction date", "value date", "posting date", "txn dt", "trans date",
];
pub const DESCRIPTION_KEYWORDS: &[&str] = &[
    "description", "narration", "particulars", "remarks", "details", "transaction details",
    "txn description", "memo",
];
pub const DEBIT_KEYWORDS: &[&str] = &[
    "debit", "withdrawal", "dr", "debit amount", "withdrawal amt", "debit amt", "withdrawals",
    "paid out", "money out",
];
pub const CREDIT_KEYWORDS: &[&str] = &[
    "credit", "deposit", "cr", "credit amount", "deposit amt", "credit amt", "deposits",
    "paid in", "money in",
];
pub const BALANCE_KEYWORDS: &[&str] = &[
    "balance", "running balance", "closing balance", "available balance", "bal",
];
pub const AMOUNT_KEYWORDS: &[&str] = &["amount", "amt", "transaction amount", "txn amount"];
pub const INDICATOR_HEADERS: &[&str] = &["type", "txn type", "transaction type", "d/c", "c/d"];

/// Words that make a row header-like; three or more mark a header row.
pub const HEADER_KEYWORDS: &[&str] = &[
    "date", "description", "narration", "particulars", "debit", "credit", "withdrawal",
    "deposit", "balance", "amount",
];
pub const HEADER_MIN_SCORE: usize = 3;
pub const HEADER_SCAN_ROWS: usize = 20;

/// Summary and footer text. Only applies to rows without a valid date.
pub const FOOTER_KEYWORDS: &[&str] = &[
    "total", "opening balance", "closing balance", "statement summary", "account summary",
    "grand total", "sub total", "subtotal", "brought forward", "carried forward",
];

/// Dated rows that carry a running balance rather than a movement.
pub const BALANCE_ROW_KEYWORDS: &[&str] = &[
    "opening balance", "closing balance", "brought forward", "carried forward", "balance b/f",
    "balance c/f",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("no date column")]
    MissingDate,
    #[error("no amount, debit or credit column")]
    MissingAmount,
    #[error("both an amount column and debit/credit columns are mapped; the side of each row would be ambiguous")]
    AmountConflict,
    #[error("a DR/CR indicator column requires an amount column")]
    OrphanIndicator,
}

/// Zero-based column positions. Either detected from a header row or
/// supplied by the caller, in which case detection is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub date: Option<usize>,
    /// Several description columns are joined with a space.
    pub description: Vec<usize>,
    pub debit: Option<usize>,
    pub credit: Option<usize>,
    /// Single signed amount column.
    pub amount: Option<usize>,
    /// DR/CR indicator paired with `amount`.
    pub indicator: Option<usize>,
    pub balance: Option<usize>,
}

impl ColumnMap {
    /// Maps the cells of a header row by keyword vocabulary. The first
    /// column claiming a role keeps it ("Txn Date" wins over "Value Date").
    pub fn from_header(row: &RawRow) -> Self {
        let mut map = ColumnMap::default();
        for (index, cell) in row.cells.iter().enumerate() {
            let text = cell.trim().to_lowercase();
            if text.is_empty() {
                continue;
            }
            let slot = match classify_header(&text) {
                Some(Role::Description) => {
                    map.description.push(index);
                    continue;
                }
                Some(Role::Date) => &mut map.date,
                Some(Role::Debit) => &mut map.debit,
                Some(Role::Credit) => &mut map.credit,
                Some(Role::Amount) => &mut map.amount,
                Some(Role::Indicator) => &mut map.indicator,
                Some(Role::Balance) => &mut map.balance,
                None => continue,
            };
            slot.get_or_insert(index);
        }
        map
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.date.is_none() {
            return Err(LayoutError::MissingDate);
        }
        let split = self.debit.is_some() || self.credit.is_some();
        match (self.amount.is_some(), split) {
            (true, true) => Err(LayoutError::AmountConflict),
            (false, false) => Err(LayoutError::MissingAmount),
            (false, true) if self.indicator.is_some() => Err(LayoutError::OrphanIndicator),
            _ => Ok(()),
        }
    }

    pub fn date_cell<'a>(&self, row: &'a RawRow) -> &'a str {
        self.date.map_or("", |i| row.cell(i))
    }

    pub fn description_text(&self, row: &RawRow) -> String {
        self.description
            .iter()
            .map(|&i| row.cell(i))
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn amount_cells<'a>(&self, row: &'a RawRow) -> AmountCells<'a> {
        match self.amount {
            Some(amount) => AmountCells::Combined {
                amount: row.cell(amount),
                indicator: self.indicator.map(|i| row.cell(i)),
            },
            None => AmountCells::Split {
                debit: self.debit.map(|i| row.cell(i)),
                credit: self.credit.map(|i| row.cell(i)),
            },
        }
    }

    pub fn balance_cell<'a>(&self, row: &'a RawRow) -> Option<&'a str> {
        self.balance.map(|i| row.cell(i)).filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Date,
    Description,
    Debit,
    Credit,
    Amount,
    Indicator,
    Balance,
}

fn classify_header(text: &str) -> Option<Role> {
    let any = |words: &[&str]| words.iter().any(|w| contains_keyword(text, w));
    if INDICATOR_HEADERS.contains(&text) || (contains_keyword(text, "dr") && contains_keyword(text, "cr")) {
        Some(Role::Indicator)
    } else if any(BALANCE_KEYWORDS) {
        Some(Role::Balance)
    } else if any(DATE_KEYWORDS) {
        Some(Role::Date)
    } else if any(DEBIT_KEYWORDS) {
        Some(Role::Debit)
    } else if any(CREDIT_KEYWORDS) {
        Some(Role::Credit)
    } else if any(AMOUNT_KEYWORDS) {
        Some(Role::Amount)
    } else if any(DESCRIPTION_KEYWORDS) {
        Some(Role::Description)
    } else {
        None
    }
}

/// Number of cells holding a header keyword. Each cell scores at most once,
/// so a long description naming several keywords still counts as one.
pub fn header_score(row: &RawRow) -> usize {
    row.cells
        .iter()
        .map(|cell| cell.trim().to_lowercase())
        .filter(|text| !text.is_empty() && HEADER_KEYWORDS.iter().any(|k| contains_keyword(text, k)))
        .count()
}

/// A row carrying a valid date is data, whatever its text says.
pub fn is_header_row(row: &RawRow) -> bool {
    header_score(row) >= HEADER_MIN_SCORE && !row.cells.iter().any(|c| parse_date(c).is_ok())
}

/// Index (into `rows`) of the first header row within the scan window.
pub fn find_header(rows: &[RawRow]) -> Option<usize> {
    rows.iter().take(HEADER_SCAN_ROWS).position(is_header_row)
}

pub fn is_footer_text(row: &RawRow) -> bool {
    let text = row.lower_text();
    FOOTER_KEYWORDS.iter().any(|k| contains_keyword(&text, k))
}

/// Text of a row that only states a balance ("Opening Balance", "B/F").
pub fn is_balance_text(text: &str) -> bool {
    let text = text.to_lowercase();
    BALANCE_ROW_KEYWORDS.iter().any(|k| contains_keyword(&text, k))
}
