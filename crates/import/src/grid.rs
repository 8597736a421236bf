use std::io::Cursor;

use calamine::{Data, Reader};
use chrono::{Duration, NaiveDate};

/// One physical row of the input, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based physical row (line) number in the source file.
    pub number: usize,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn new(number: usize, cells: Vec<String>) -> Self {
        Self { number, cells }
    }

    /// Cell at `index`, trimmed; empty when the row is shorter.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map_or("", |c| c.trim())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }

    /// Non-empty cells joined with `" | "`, kept on transactions for audit.
    pub fn joined(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Lower-cased text of the whole row for keyword tests.
    pub fn lower_text(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Reads delimited text into raw rows. Decoding is lossy so a stray
/// cp1252 byte does not abort the import; a UTF-8 BOM is dropped and
/// rows may have differing lengths.
pub fn read_delimited(bytes: &[u8], delimiter: u8) -> Result<Vec<RawRow>, csv::Error> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let mut rows = Vec::new();
    let mut record = csv::ByteRecord::new();
    while reader.read_byte_record(&mut record)? {
        let number = record
            .position()
            .map_or(rows.len() + 1, |p| p.line() as usize);
        let cells = record
            .iter()
            .map(|field| String::from_utf8_lossy(field).trim().to_string())
            .collect();
        rows.push(RawRow::new(number, cells));
    }
    Ok(rows)
}

/// Reads the first worksheet of a spreadsheet. Date cells become ISO
/// dates and numbers plain decimal text, so both flow through the same
/// normalizers as text input.
pub fn read_workbook(bytes: &[u8]) -> Result<Vec<RawRow>, calamine::Error> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Ok(Vec::new());
    };
    let range = range?;
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let first_col = range.start().map_or(0, |(_, col)| col as usize);

    Ok(range
        .rows()
        .enumerate()
        .map(|(i, row)| {
            let mut cells = vec![String::new(); first_col];
            cells.extend(row.iter().map(render_cell));
            RawRow::new(first_row + i + 1, cells)
        })
        .collect())
}

fn render_cell(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Float(f) => render_number(*f),
        Data::Int(i) => i.to_string(),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64()),
        other => other.to_string(),
    }
}

fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Excel serials count days from 1899-12-30 (the 1900 leap-year quirk).
fn excel_serial_to_date(serial: f64) -> String {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|base| base.checked_add_signed(Duration::days(serial.floor() as i64)))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| serial.to_string())
}
