use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tally_core::Money;
use thiserror::Error;

re!(re_trailing_marker, r"(?i)^(.*?)\s*(dr|cr)\.?$");
re!(re_leading_marker, r"(?i)^(dr|cr)\.?\s+(.+)$");
re!(re_currency, r"(?i)₹|\brs\.?|\binr\b|\busd\b|\$|€|£");
re!(re_numeric, r"^(\d+(\.\d*)?|\.\d+)$");

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,
    #[error("not a valid amount: {raw:?}")]
    Invalid { raw: String },
    #[error("row has both a debit ({debit}) and a credit ({credit})")]
    BothSides { debit: String, credit: String },
}

/// Debit/credit marker written next to an amount or in its own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Marker {
    Dr,
    Cr,
}

impl Marker {
    /// Reads an indicator cell such as `Dr`, `CR.`, `Debit` or `Deposit`.
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.trim().trim_end_matches('.').to_lowercase();
        match token.as_str() {
            "dr" | "d" | "debit" | "withdrawal" => Some(Marker::Dr),
            "cr" | "c" | "credit" | "deposit" => Some(Marker::Cr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAmount {
    /// Signed value; a DR marker, parentheses or a minus make it negative.
    pub value: Decimal,
    pub marker: Option<Marker>,
}

impl ParsedAmount {
    /// Routes the value into `(debit, credit)`. An explicit marker decides
    /// the side; otherwise negative values are debits.
    pub fn split(self, indicator: Option<Marker>) -> (Money, Money) {
        let magnitude = Money::from_decimal(self.value.abs());
        match indicator.or(self.marker) {
            Some(Marker::Dr) => (magnitude, Money::zero()),
            Some(Marker::Cr) => (Money::zero(), magnitude),
            None if self.value.is_sign_negative() => (magnitude, Money::zero()),
            None => (Money::zero(), magnitude),
        }
    }
}

/// Cells `""`, `"-"` and `"--"` mean "no amount" in statement exports.
pub fn is_blank_amount(raw: &str) -> bool {
    matches!(raw.trim(), "" | "-" | "--")
}

/// Parses amount text such as `"9,17,390.58"`, `"₹ 1,234.00 DR"`, `"(75.25)"`
/// or `"500-"`. Lakh and thousand grouping are both accepted.
pub fn parse_amount(raw: &str) -> Result<ParsedAmount, AmountParseError> {
    let invalid = || AmountParseError::Invalid { raw: raw.to_string() };
    if is_blank_amount(raw) {
        return Err(AmountParseError::Empty);
    }

    let mut text = raw.trim().to_string();
    let mut marker = None;
    if let Some(caps) = re_trailing_marker().captures(&text) {
        marker = Marker::parse(&caps[2]);
        text = caps[1].to_string();
    } else if let Some(caps) = re_leading_marker().captures(&text) {
        marker = Marker::parse(&caps[1]);
        text = caps[2].to_string();
    }

    let mut negative = false;
    let mut body = re_currency().replace_all(text.trim(), "").trim().to_string();
    if body.starts_with('(') && body.ends_with(')') && body.len() >= 2 {
        negative = true;
        body = body[1..body.len() - 1].trim().to_string();
    }
    if let Some(rest) = body.strip_prefix('-') {
        negative = true;
        body = rest.to_string();
    } else if let Some(rest) = body.strip_suffix('-') {
        negative = true;
        body = rest.to_string();
    } else if let Some(rest) = body.strip_prefix('+') {
        body = rest.to_string();
    }

    let digits: String = re_currency()
        .replace_all(&body, "")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if !re_numeric().is_match(&digits) {
        return Err(invalid());
    }
    let mut value = Decimal::from_str(&digits).map_err(|_| invalid())?;
    if negative || marker == Some(Marker::Dr) {
        value = -value;
    }
    Ok(ParsedAmount { value, marker })
}

/// The amount cells of one row, as laid out by the statement's columns.
#[derive(Debug, Clone, Copy)]
pub enum AmountCells<'a> {
    /// One signed amount column, optionally with a DR/CR indicator column.
    Combined {
        amount: &'a str,
        indicator: Option<&'a str>,
    },
    /// Separate debit and credit columns, trusted as labelled.
    Split {
        debit: Option<&'a str>,
        credit: Option<&'a str>,
    },
}

impl AmountCells<'_> {
    /// True when no amount cell carries a value.
    pub fn is_blank(&self) -> bool {
        match self {
            AmountCells::Combined { amount, .. } => is_blank_amount(amount),
            AmountCells::Split { debit, credit } => {
                debit.map_or(true, is_blank_amount) && credit.map_or(true, is_blank_amount)
            }
        }
    }
}

/// Resolves a row's amount cells into non-negative `(debit, credit)`.
/// Blank cells yield zero; both sides zero marks an informational row.
pub fn resolve_debit_credit(cells: AmountCells<'_>) -> Result<(Money, Money), AmountParseError> {
    match cells {
        AmountCells::Combined { amount, indicator } => {
            if is_blank_amount(amount) {
                return Ok((Money::zero(), Money::zero()));
            }
            let parsed = parse_amount(amount)?;
            Ok(parsed.split(indicator.and_then(Marker::parse)))
        }
        AmountCells::Split { debit, credit } => {
            let side = |cell: Option<&str>| -> Result<Money, AmountParseError> {
                match cell {
                    Some(raw) if !is_blank_amount(raw) => {
                        Ok(Money::from_decimal(parse_amount(raw)?.value.abs()))
                    }
                    _ => Ok(Money::zero()),
                }
            };
            let (d, c) = (side(debit)?, side(credit)?);
            if d.is_positive() && c.is_positive() {
                return Err(AmountParseError::BothSides {
                    debit: d.to_string(),
                    credit: c.to_string(),
                });
            }
            Ok((d, c))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn value(raw: &str) -> Decimal {
        parse_amount(raw).unwrap().value
    }

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn lakh_grouping() {
        assert_eq!(value("9,17,390.58"), dec("917390.58"));
    }

    #[test]
    fn thousand_grouping_and_currency() {
        assert_eq!(value("₹ 1,234.50"), dec("1234.50"));
        assert_eq!(value("Rs. 99"), dec("99"));
        assert_eq!(value("INR 2,000.00"), dec("2000.00"));
        assert_eq!(value("$5.25"), dec("5.25"));
    }

    #[test]
    fn negative_conventions() {
        assert_eq!(value("(75.25)"), dec("-75.25"));
        assert_eq!(value("-50.00"), dec("-50.00"));
        assert_eq!(value("500-"), dec("-500"));
    }

    #[test]
    fn trailing_and_leading_markers() {
        let dr = parse_amount("1,234.00 DR").unwrap();
        assert_eq!(dr.marker, Some(Marker::Dr));
        assert_eq!(dr.value, dec("-1234.00"));

        let cr = parse_amount("1,234.00Cr").unwrap();
        assert_eq!(cr.marker, Some(Marker::Cr));
        assert_eq!(cr.value, dec("1234.00"));

        assert_eq!(parse_amount("Dr 10").unwrap().marker, Some(Marker::Dr));
    }

    #[test]
    fn garbage_is_an_error_not_zero() {
        assert!(matches!(parse_amount("n/a"), Err(AmountParseError::Invalid { .. })));
        assert!(matches!(parse_amount("12.3.4"), Err(AmountParseError::Invalid { .. })));
        assert!(matches!(parse_amount("₹"), Err(AmountParseError::Invalid { .. })));
        assert_eq!(parse_amount("  "), Err(AmountParseError::Empty));
        assert_eq!(parse_amount("--"), Err(AmountParseError::Empty));
    }

    #[test]
    fn invalid_keeps_raw_text() {
        let err = parse_amount("abc").unwrap_err();
        assert_eq!(err, AmountParseError::Invalid { raw: "abc".into() });
    }

    // ── resolve_debit_credit ─────────────────────────────────────────────────

    #[test]
    fn combined_with_dr_suffix_is_debit() {
        let (d, c) = resolve_debit_credit(AmountCells::Combined { amount: "1,234.00 DR", indicator: None })
            .unwrap();
        assert_eq!(d, Money::from_cents(123_400));
        assert_eq!(c, Money::zero());
    }

    #[test]
    fn combined_sign_decides_side() {
        let (d, c) =
            resolve_debit_credit(AmountCells::Combined { amount: "-20", indicator: None }).unwrap();
        assert_eq!((d, c), (Money::from_cents(2_000), Money::zero()));
        let (d, c) =
            resolve_debit_credit(AmountCells::Combined { amount: "20", indicator: None }).unwrap();
        assert_eq!((d, c), (Money::zero(), Money::from_cents(2_000)));
    }

    #[test]
    fn indicator_column_overrides_sign() {
        let (d, c) = resolve_debit_credit(AmountCells::Combined { amount: "20", indicator: Some("Dr") })
            .unwrap();
        assert_eq!((d, c), (Money::from_cents(2_000), Money::zero()));
        let (d, c) =
            resolve_debit_credit(AmountCells::Combined { amount: "20", indicator: Some("CR") }).unwrap();
        assert_eq!((d, c), (Money::zero(), Money::from_cents(2_000)));
    }

    #[test]
    fn split_columns_trusted_as_labelled() {
        let (d, c) =
            resolve_debit_credit(AmountCells::Split { debit: Some("(1,000.00)"), credit: Some("") }).unwrap();
        assert_eq!((d, c), (Money::from_cents(100_000), Money::zero()));
        let (d, c) = resolve_debit_credit(AmountCells::Split { debit: Some("-"), credit: Some("250") }).unwrap();
        assert_eq!((d, c), (Money::zero(), Money::from_cents(25_000)));
    }

    #[test]
    fn split_both_sides_is_rejected() {
        let err = resolve_debit_credit(AmountCells::Split { debit: Some("10"), credit: Some("20") });
        assert!(matches!(err, Err(AmountParseError::BothSides { .. })));
    }

    #[test]
    fn blank_cells_are_informational() {
        let cells = AmountCells::Split { debit: Some(""), credit: None };
        assert!(cells.is_blank());
        assert_eq!(resolve_debit_credit(cells).unwrap(), (Money::zero(), Money::zero()));
    }
}
