use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

re!(re_iso, r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})(?:[ T]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$");
re!(re_numeric, r"^(\d{1,2})([-/.])(\d{1,2})[-/.](\d{4}|\d{2})(?:\s+\d{1,2}:\d{2}(?::\d{2})?(?:\s*[AaPp][Mm])?)?$");
re!(re_day_month_name, r"^(\d{1,2})(?:st|nd|rd|th)?[\s\-/]+([A-Za-z]{3,9})\.?,?[\s\-/]+(\d{4}|\d{2})$");
re!(re_month_name_day, r"^([A-Za-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})$");
re!(re_date_shape, r"^(\d{1,4}[-/.]\d{1,2}[-/.]\d{1,4}|\d{1,2}[\s\-/]+[A-Za-z]{3,9}\.?[\s\-/]+\d{2,4}|[A-Za-z]{3,9}\.?\s+\d{1,2},?\s+\d{4})\b");

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june",
    "july", "august", "september", "october", "november", "december",
];

/// Date text that matched none of the known formats. The raw text is kept
/// so the row can be reported for review.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("unrecognized date: {raw:?}")]
pub struct DateParseError {
    pub raw: String,
}

/// Field order for ambiguous numeric dates such as "05/06/23".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateOrder {
    #[default]
    #[serde(rename = "dmy", alias = "day-first")]
    DayFirst,
    #[serde(rename = "mdy", alias = "month-first")]
    MonthFirst,
    #[serde(rename = "ymd", alias = "year-first")]
    YearFirst,
}

impl std::str::FromStr for DateOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dmy" | "day-first" => Ok(DateOrder::DayFirst),
            "mdy" | "month-first" => Ok(DateOrder::MonthFirst),
            "ymd" | "year-first" => Ok(DateOrder::YearFirst),
            other => Err(format!("Unknown date order: '{other}'")),
        }
    }
}

/// Parses a statement date with the default day-first order.
pub fn parse_date(raw: &str) -> Result<NaiveDate, DateParseError> {
    parse_date_with(raw, DateOrder::DayFirst)
}

/// Parses a statement date. Tried in order: ISO year-first (optionally
/// with a time), numeric dates with `/`, `-` or `.` separators, and
/// textual months ("05 Jun 2023", "5-June-23", "Jun 5, 2023").
///
/// Numeric dates follow `order`; when that reading is impossible (a month
/// slot above 12) the day/month swap is tried.
pub fn parse_date_with(raw: &str, order: DateOrder) -> Result<NaiveDate, DateParseError> {
    let text = raw.trim();
    parse_iso(text)
        .or_else(|| parse_numeric(text, order))
        .or_else(|| parse_textual(text))
        .ok_or_else(|| DateParseError { raw: raw.to_string() })
}

/// True when the text is shaped like a date even if it is not a valid one
/// ("31/02/2023"). Separates bad dates from ordinary description text.
pub fn looks_like_date(raw: &str) -> bool {
    re_date_shape().is_match(raw.trim())
}

fn parse_iso(text: &str) -> Option<NaiveDate> {
    let caps = re_iso().captures(text)?;
    NaiveDate::from_ymd_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, caps[3].parse().ok()?)
}

fn parse_numeric(text: &str, order: DateOrder) -> Option<NaiveDate> {
    let caps = re_numeric().captures(text)?;
    let first: u32 = caps[1].parse().ok()?;
    let second: u32 = caps[3].parse().ok()?;
    if order == DateOrder::YearFirst && caps[4].len() == 2 {
        let day: u32 = caps[4].parse().ok()?;
        return NaiveDate::from_ymd_opt(expand_year(&caps[1])?, second, day);
    }
    let year = expand_year(&caps[4])?;
    let (day, month) = match order {
        DateOrder::MonthFirst => (second, first),
        DateOrder::DayFirst | DateOrder::YearFirst => (first, second),
    };
    NaiveDate::from_ymd_opt(year, month, day).or_else(|| {
        if month > 12 {
            NaiveDate::from_ymd_opt(year, day, month)
        } else {
            None
        }
    })
}

fn parse_textual(text: &str) -> Option<NaiveDate> {
    if let Some(caps) = re_day_month_name().captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        return NaiveDate::from_ymd_opt(expand_year(&caps[3])?, month_number(&caps[2])?, day);
    }
    let caps = re_month_name_day().captures(text)?;
    NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month_number(&caps[1])?, caps[2].parse().ok()?)
}

/// Two-digit years pivot at 69: "23" is 2023, "85" is 1985.
fn expand_year(text: &str) -> Option<i32> {
    let year: i32 = text.parse().ok()?;
    Some(match text.len() {
        2 if year < 69 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

fn month_number(name: &str) -> Option<u32> {
    let name = name.to_lowercase();
    if name.len() < 3 {
        return None;
    }
    let name = if name == "sept" { "sep".to_string() } else { name };
    MONTHS
        .iter()
        .position(|full| full.starts_with(&name))
        .map(|i| i as u32 + 1)
}
