use chrono::NaiveDate;
use tally_core::Money;
use tracing::{debug, info};

use crate::amount::parse_amount;
use crate::date::{looks_like_date, parse_date, parse_date_with, DateOrder, DateParseError};
use crate::grid::RawRow;
use crate::ingest::{
    parse_balance, push_rejected, reject, Draft, IngestFormatError, OwnedCells, ParseOutcome,
    RejectReason, TabularIngestor,
};
use crate::layout::{
    find_header, is_balance_text, is_footer_text, is_header_row, ColumnMap, LayoutError,
};

const NAME: &str = "date-anchored";

re!(re_money_token, r"(?i)^\(?[-+]?\s*(?:₹|rs\.?|inr|\$)?\s*\d[\d,]*(?:\.\d+)?\)?\s*-?\s*(?:dr|cr)?\.?$");

/// Strategy for loosely structured text tables (PDF or OCR conversions).
///
/// A row whose first resolvable cell is a date starts a transaction; the
/// undated rows that follow are continuation lines whose text is appended
/// to its description. Columns come from the caller, from a header row if
/// one is found, or else from the shape of each row: trailing money
/// tokens are the amount and the running balance, the rest is text.
#[derive(Debug, Clone, Default)]
pub struct DateAnchored {
    columns: Option<ColumnMap>,
    date_order: DateOrder,
}

#[derive(Debug, Clone)]
enum Layout {
    Mapped(ColumnMap),
    FreeForm,
}

enum Anchor {
    Start(NaiveDate),
    BadDate(DateParseError),
    Continuation,
}

impl DateAnchored {
    pub fn new(columns: Option<ColumnMap>) -> Self {
        Self { columns, date_order: DateOrder::default() }
    }

    pub fn with_date_order(mut self, date_order: DateOrder) -> Self {
        self.date_order = date_order;
        self
    }

    fn layout(&self, rows: &[RawRow]) -> Result<(Layout, Option<usize>), IngestFormatError> {
        let header = find_header(rows);
        if let Some(columns) = &self.columns {
            columns
                .validate()
                .map_err(|e| IngestFormatError::layout(NAME, "column overrides", e))?;
            return Ok((Layout::Mapped(columns.clone()), header));
        }
        let Some(index) = header else {
            return Ok((Layout::FreeForm, None));
        };
        let columns = ColumnMap::from_header(&rows[index]);
        match columns.validate() {
            Ok(()) => {
                info!(row = rows[index].number, ?columns, "header row detected");
                Ok((Layout::Mapped(columns), header))
            }
            Err(LayoutError::AmountConflict) => Err(IngestFormatError::layout(
                NAME,
                &format!("header on row {}", rows[index].number),
                LayoutError::AmountConflict,
            )),
            Err(err) => {
                debug!(row = rows[index].number, %err, "header unusable, reading rows by shape");
                Ok((Layout::FreeForm, header))
            }
        }
    }
}

impl Layout {
    fn anchor(&self, row: &RawRow, order: DateOrder) -> Anchor {
        let text = match self {
            Layout::Mapped(columns) => columns.date_cell(row),
            Layout::FreeForm => row.cells.iter().map(|c| c.trim()).find(|c| !c.is_empty()).unwrap_or(""),
        };
        if text.is_empty() {
            return Anchor::Continuation;
        }
        match parse_date_with(text, order) {
            Ok(date) => Anchor::Start(date),
            Err(err) if looks_like_date(text) => Anchor::BadDate(err),
            Err(_) => Anchor::Continuation,
        }
    }

    fn start(&self, row: &RawRow, date: NaiveDate) -> Draft {
        match self {
            Layout::Mapped(columns) => {
                let mut draft = Draft::start(row, date, OwnedCells::from_cells(columns.amount_cells(row)));
                draft.push_description(&columns.description_text(row));
                draft.balance = columns.balance_cell(row).map(str::to_string);
                draft
            }
            Layout::FreeForm => {
                let blank = OwnedCells::Combined { amount: String::new(), indicator: None };
                let mut draft = Draft::start(row, date, blank);
                let first = row.cells.iter().position(|c| !c.trim().is_empty()).unwrap_or(0);
                fill_free_form(&mut draft, &row.cells[first + 1..]);
                draft
            }
        }
    }

    fn continue_draft(&self, draft: &mut Draft, row: &RawRow) {
        draft.absorb(row);
        match self {
            Layout::Mapped(columns) => {
                draft.push_description(&columns.description_text(row));
                if draft.amounts.is_blank() {
                    draft.amounts = OwnedCells::from_cells(columns.amount_cells(row));
                }
                if draft.balance.is_none() {
                    draft.balance = columns.balance_cell(row).map(str::to_string);
                }
            }
            Layout::FreeForm => fill_free_form(draft, &row.cells),
        }
    }
}

fn is_money_token(cell: &str) -> bool {
    re_money_token().is_match(cell) && parse_amount(cell).is_ok()
}

/// Splits free-form cells into description text and money tokens. The
/// last two tokens are amount and balance; a lone token is the amount,
/// except on balance rows ("Opening Balance") where it is the balance.
/// Only slots the draft has not filled yet are taken.
fn fill_free_form(draft: &mut Draft, cells: &[String]) {
    let mut tokens = Vec::new();
    for cell in cells.iter().map(|c| c.trim()).filter(|c| !c.is_empty()) {
        if is_money_token(cell) {
            tokens.push(cell);
        } else if parse_date(cell).is_err() {
            draft.push_description(cell);
        }
    }
    let amount_blank = draft.amounts.is_blank();
    let balance_row = is_balance_text(&draft.description.join(" "));
    let (amount, balance) = match tokens.as_slice() {
        [] => (None, None),
        [.., balance] if balance_row => (None, Some(*balance)),
        [only] if amount_blank => (Some(*only), None),
        [only] => (None, Some(*only)),
        [.., amount, balance] => (Some(*amount), Some(*balance)),
    };
    if let (true, Some(amount)) = (amount_blank, amount) {
        draft.amounts = OwnedCells::Combined { amount: amount.to_string(), indicator: None };
    }
    if draft.balance.is_none() {
        draft.balance = balance.map(str::to_string);
    }
}

/// For an unsigned free-form amount, the move of the running balance tells
/// the side: a balance that fell by the amount means a debit.
fn infer_sides(draft: &Draft, last_balance: Option<Money>) -> Option<(Money, Money)> {
    let OwnedCells::Combined { amount, indicator: None } = &draft.amounts else {
        return None;
    };
    let parsed = parse_amount(amount).ok()?;
    if parsed.marker.is_some() || parsed.value.is_sign_negative() {
        return None;
    }
    let previous = last_balance?;
    let balance = parse_balance(draft.balance.as_deref())?;
    let magnitude = Money::from_decimal(parsed.value);
    ((previous - magnitude - balance).abs() <= Money::from_cents(1))
        .then_some((magnitude, Money::zero()))
}

struct State {
    outcome: ParseOutcome,
    draft: Option<Draft>,
    anchors: usize,
    last_balance: Option<Money>,
}

impl State {
    fn flush(&mut self, layout: &Layout) {
        let Some(draft) = self.draft.take() else {
            return;
        };
        let sides = match layout {
            Layout::FreeForm => infer_sides(&draft, self.last_balance),
            Layout::Mapped(_) => None,
        };
        match draft.finish(sides) {
            Ok(tx) => {
                if tx.balance.is_some() {
                    self.last_balance = tx.balance;
                }
                self.outcome.transactions.push(tx);
            }
            Err(rejected) => push_rejected(&mut self.outcome, rejected),
        }
    }
}

impl TabularIngestor for DateAnchored {
    fn name(&self) -> &'static str {
        NAME
    }

    fn parse(&self, rows: &[RawRow]) -> Result<ParseOutcome, IngestFormatError> {
        let (layout, header) = self.layout(rows)?;
        let mut state = State {
            outcome: ParseOutcome::default(),
            draft: None,
            anchors: 0,
            last_balance: None,
        };

        let body_start = header.map_or(0, |h| h + 1);
        for (i, row) in rows[..body_start].iter().enumerate() {
            let reason = if Some(i) == header {
                RejectReason::Header
            } else if row.is_blank() {
                RejectReason::Blank
            } else {
                RejectReason::Preamble
            };
            reject(&mut state.outcome, row, reason);
        }

        for row in &rows[body_start..] {
            if row.is_blank() {
                reject(&mut state.outcome, row, RejectReason::Blank);
                continue;
            }
            if is_header_row(row) {
                state.flush(&layout);
                reject(&mut state.outcome, row, RejectReason::RepeatedHeader);
                continue;
            }
            match layout.anchor(row, self.date_order) {
                Anchor::Start(date) => {
                    state.flush(&layout);
                    state.anchors += 1;
                    state.draft = Some(layout.start(row, date));
                }
                Anchor::BadDate(err) => {
                    state.flush(&layout);
                    state.anchors += 1;
                    reject(&mut state.outcome, row, RejectReason::InvalidDate(err));
                }
                Anchor::Continuation if is_footer_text(row) => {
                    state.flush(&layout);
                    reject(&mut state.outcome, row, RejectReason::Footer);
                }
                Anchor::Continuation => match state.draft.as_mut() {
                    Some(draft) => layout.continue_draft(draft, row),
                    None if state.anchors == 0 => {
                        reject(&mut state.outcome, row, RejectReason::Preamble)
                    }
                    None => reject(&mut state.outcome, row, RejectReason::OrphanContinuation),
                },
            }
        }
        state.flush(&layout);

        if state.anchors == 0 {
            return Err(IngestFormatError::new(
                NAME,
                format!("none of the {} rows begins with a recognizable date", rows.len()),
            ));
        }
        Ok(state.outcome)
    }
}
