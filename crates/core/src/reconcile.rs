use serde::Serialize;

use crate::money::Money;
use crate::transaction::Transaction;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceMismatch {
    /// Position in the transaction sequence.
    pub index: usize,
    pub expected: Money,
    pub displayed: Money,
    /// `expected - displayed`; positive suggests a missing debit.
    pub difference: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub opening_balance: Option<Money>,
    pub closing_balance: Option<Money>,
    /// Rows that displayed a balance and were compared.
    pub checked: usize,
    pub mismatches: Vec<BalanceMismatch>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Re-computes the running balance in statement order and compares it with
/// the balance column. After a mismatch the running balance resyncs to the
/// displayed value so one gap is reported once.
pub fn reconcile(transactions: &[Transaction], tolerance: Money) -> ReconciliationReport {
    let Some(first) = transactions.iter().position(|t| t.balance.is_some()) else {
        return ReconciliationReport {
            opening_balance: None,
            closing_balance: None,
            checked: 0,
            mismatches: Vec::new(),
        };
    };

    let anchor = &transactions[first];
    let opening = anchor.balance.unwrap_or_default() + anchor.debit - anchor.credit;
    let mut running = opening;
    let mut checked = 0;
    let mut mismatches = Vec::new();

    for (index, tx) in transactions.iter().enumerate().skip(first) {
        running = running + tx.credit - tx.debit;
        if let Some(displayed) = tx.balance {
            checked += 1;
            let difference = running - displayed;
            if difference.abs() > tolerance {
                mismatches.push(BalanceMismatch {
                    index,
                    expected: running,
                    displayed,
                    difference,
                });
                running = displayed;
            }
        }
    }

    ReconciliationReport {
        opening_balance: Some(opening),
        closing_balance: Some(running),
        checked,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(debit: i64, credit: i64, balance: Option<i64>) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2023, 6, 5).unwrap(),
            "row",
            Money::from_cents(debit),
            Money::from_cents(credit),
            balance.map(Money::from_cents),
        )
        .unwrap()
    }

    #[test]
    fn consistent_statement_is_clean() {
        let txs = vec![tx(1_000, 0, Some(9_000)), tx(0, 500, Some(9_500)), tx(2_500, 0, Some(7_000))];
        let r = reconcile(&txs, Money::from_cents(1));
        assert!(r.is_clean());
        assert_eq!(r.opening_balance, Some(Money::from_cents(10_000)));
        assert_eq!(r.closing_balance, Some(Money::from_cents(7_000)));
        assert_eq!(r.checked, 3);
    }

    #[test]
    fn missing_debit_is_reported_once() {
        // A 1,000 debit between rows 1 and 2 was dropped.
        let txs = vec![tx(1_000, 0, Some(9_000)), tx(0, 500, Some(8_500)), tx(500, 0, Some(8_000))];
        let r = reconcile(&txs, Money::from_cents(1));
        assert_eq!(r.mismatches.len(), 1);
        assert_eq!(r.mismatches[0].index, 1);
        assert_eq!(r.mismatches[0].difference, Money::from_cents(1_000));
    }

    #[test]
    fn no_balance_column_checks_nothing() {
        let r = reconcile(&[tx(100, 0, None)], Money::from_cents(1));
        assert_eq!(r.checked, 0);
        assert!(r.opening_balance.is_none());
    }
}
