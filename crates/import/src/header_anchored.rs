use tracing::info;

use crate::date::{parse_date_with, DateOrder};
use crate::grid::RawRow;
use crate::ingest::{
    push_rejected, reject, Draft, IngestFormatError, OwnedCells, ParseOutcome, RejectReason,
    TabularIngestor,
};
use crate::layout::{
    find_header, is_footer_text, is_header_row, ColumnMap, HEADER_MIN_SCORE, HEADER_SCAN_ROWS,
};

const NAME: &str = "header-anchored";

/// Strategy for structured spreadsheets: find the header row, then map
/// each following row positionally.
///
/// Blank rows are skipped. A footer row closes the block; later rows are
/// outside it until a repeated header (new page) or a dated row reopens it.
#[derive(Debug, Clone, Default)]
pub struct HeaderAnchored {
    columns: Option<ColumnMap>,
    date_order: DateOrder,
}

impl HeaderAnchored {
    pub fn new(columns: Option<ColumnMap>) -> Self {
        Self { columns, date_order: DateOrder::default() }
    }

    pub fn with_date_order(mut self, date_order: DateOrder) -> Self {
        self.date_order = date_order;
        self
    }

    fn layout(&self, rows: &[RawRow]) -> Result<(ColumnMap, Option<usize>), IngestFormatError> {
        let header = find_header(rows);
        if let Some(columns) = &self.columns {
            columns
                .validate()
                .map_err(|e| IngestFormatError::layout(NAME, "column overrides", e))?;
            return Ok((columns.clone(), header));
        }
        let index = header.ok_or_else(|| {
            IngestFormatError::new(
                NAME,
                format!(
                    "no header row with at least {HEADER_MIN_SCORE} column keywords in the first {HEADER_SCAN_ROWS} rows"
                ),
            )
        })?;
        let columns = ColumnMap::from_header(&rows[index]);
        columns.validate().map_err(|e| {
            IngestFormatError::layout(NAME, &format!("header on row {}", rows[index].number), e)
        })?;
        info!(row = rows[index].number, ?columns, "header row detected");
        Ok((columns, Some(index)))
    }
}

impl TabularIngestor for HeaderAnchored {
    fn name(&self) -> &'static str {
        NAME
    }

    fn parse(&self, rows: &[RawRow]) -> Result<ParseOutcome, IngestFormatError> {
        let (columns, header) = self.layout(rows)?;
        let mut outcome = ParseOutcome::default();

        let body_start = header.map_or(0, |h| h + 1);
        for (i, row) in rows[..body_start].iter().enumerate() {
            let reason = if Some(i) == header {
                RejectReason::Header
            } else if row.is_blank() {
                RejectReason::Blank
            } else {
                RejectReason::Preamble
            };
            reject(&mut outcome, row, reason);
        }

        let mut in_block = true;
        for row in &rows[body_start..] {
            if row.is_blank() {
                reject(&mut outcome, row, RejectReason::Blank);
                continue;
            }
            if is_header_row(row) {
                in_block = true;
                reject(&mut outcome, row, RejectReason::RepeatedHeader);
                continue;
            }

            let date_text = columns.date_cell(row);
            let amounts = OwnedCells::from_cells(columns.amount_cells(row));
            let date = match parse_date_with(date_text, self.date_order) {
                Ok(date) => date,
                Err(err) => {
                    let reason = if !in_block {
                        RejectReason::OutsideBlock
                    } else if is_footer_text(row) {
                        in_block = false;
                        RejectReason::Footer
                    } else if !date_text.is_empty() {
                        RejectReason::InvalidDate(err)
                    } else if !amounts.is_blank() {
                        RejectReason::MissingDate
                    } else {
                        RejectReason::Unmapped
                    };
                    reject(&mut outcome, row, reason);
                    continue;
                }
            };

            in_block = true;
            let mut draft = Draft::start(row, date, amounts);
            draft.push_description(&columns.description_text(row));
            draft.balance = columns.balance_cell(row).map(str::to_string);
            match draft.finish(None) {
                Ok(tx) => outcome.transactions.push(tx),
                Err(rejected) => push_rejected(&mut outcome, rejected),
            }
        }

        Ok(outcome)
    }
}
