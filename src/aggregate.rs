//! Named reductions computed over a filtered record set.

use std::borrow::Borrow;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::record::{Record, Value};

/// Statistics shown above a table, keyed by name.
pub type Stats = BTreeMap<String, f64>;

/// One independently defined reduction.
///
/// Aggregates are evaluated in order, so a [`Aggregate::Difference`] can
/// refer to names produced by earlier entries.
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Count { name: &'static str },
    CountWhere { name: &'static str, field: &'static str, equals: &'static str },
    /// Records whose `field` is at most their own `limit_field`; both must be numeric.
    CountAtMost { name: &'static str, field: &'static str, limit_field: &'static str },
    Sum { name: &'static str, field: &'static str },
    SumWhere { name: &'static str, field: &'static str, when: &'static str, equals: &'static str },
    SumProduct { name: &'static str, left: &'static str, right: &'static str },
    Difference { name: &'static str, minuend: &'static str, subtrahend: &'static str },
}

impl Aggregate {
    pub fn name(&self) -> &'static str {
        match self {
            Aggregate::Count { name }
            | Aggregate::CountWhere { name, .. }
            | Aggregate::CountAtMost { name, .. }
            | Aggregate::Sum { name, .. }
            | Aggregate::SumWhere { name, .. }
            | Aggregate::SumProduct { name, .. }
            | Aggregate::Difference { name, .. } => name,
        }
    }

    fn evaluate<R: Borrow<Record>>(&self, records: &[R], computed: &Stats) -> f64 {
        fn is(r: &Record, field: &str, equals: &str) -> bool {
            r.get(field).is_some_and(|v| v.exact_eq(&Value::from(equals)))
        }
        let rows = || records.iter().map(<R as Borrow<Record>>::borrow);
        match self {
            Aggregate::Count { .. } => records.len() as f64,
            Aggregate::CountWhere { field, equals, .. } => {
                rows().filter(|r| is(r, field, equals)).count() as f64
            }
            Aggregate::CountAtMost { field, limit_field, .. } => rows()
                .filter(|r| {
                    let value = r.get(field).and_then(Value::as_number);
                    let limit = r.get(limit_field).and_then(Value::as_number);
                    matches!((value, limit), (Some(v), Some(l)) if v <= l)
                })
                .count() as f64,
            Aggregate::Sum { field, .. } => rows().map(|r| r.number(field)).sum(),
            Aggregate::SumWhere { field, when, equals, .. } => rows()
                .filter(|r| is(r, when, equals))
                .map(|r| r.number(field))
                .sum(),
            Aggregate::SumProduct { left, right, .. } => {
                rows().map(|r| r.number(left) * r.number(right)).sum()
            }
            Aggregate::Difference { minuend, subtrahend, .. } => {
                computed.get(*minuend).copied().unwrap_or(0.0) - computed.get(*subtrahend).copied().unwrap_or(0.0)
            }
        }
    }
}

/// Computes every aggregate over `records` into a fresh mapping.
pub fn aggregate<R: Borrow<Record>>(records: &[R], aggregates: &[Aggregate]) -> Stats {
    let mut stats = Stats::new();
    for a in aggregates {
        let value = a.evaluate(records, &stats);
        stats.insert(a.name().to_owned(), value);
    }
    stats
}

/// How urgently a low-stock item needs reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyTier {
    Critical,
    High,
    Medium,
}

impl UrgencyTier {
    /// Tier of `shortage / reorder_level`: above 0.8 is critical, above 0.5 high.
    ///
    /// A zero reorder level gives an infinite ratio for a positive shortage
    /// (critical) and no ratio at all for a zero shortage (medium).
    pub fn classify(shortage: f64, reorder_level: f64) -> Self {
        let ratio = shortage / reorder_level;
        if ratio > 0.8 {
            UrgencyTier::Critical
        } else if ratio > 0.5 {
            UrgencyTier::High
        } else {
            UrgencyTier::Medium
        }
    }
}

/// Rounds to one decimal place.
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// `value` as a percentage of `total`, one decimal; 0 when there is no total.
pub fn percentage_of_total(value: f64, total: f64) -> f64 {
    if total == 0.0 || !total.is_finite() || !value.is_finite() {
        return 0.0;
    }
    round1(value / total * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(kind: &str, quantity: i64) -> Record {
        Record::new().with("transaction_type", kind).with("quantity", quantity)
    }

    #[test]
    fn stock_in_out_and_net_change() {
        let records = vec![tx("IN", 10), tx("OUT", 4)];
        let stats = aggregate(&records, &crate::entity::Entity::Transactions.profile().aggregates);
        assert_eq!(stats["stockIn"], 10.0);
        assert_eq!(stats["stockOut"], 4.0);
        assert_eq!(stats["netChange"], 6.0);
        assert_eq!(stats["total"], 2.0);
    }

    #[test]
    fn missing_numbers_contribute_nothing() {
        let records = vec![tx("IN", 3), Record::new().with("transaction_type", "IN"), tx("IN", 2).with("quantity", "n/a")];
        let stats = aggregate(&records, &[Aggregate::SumWhere { name: "in", field: "quantity", when: "transaction_type", equals: "IN" }]);
        assert_eq!(stats["in"], 3.0);
    }

    #[test]
    fn low_stock_needs_both_fields() {
        let records = vec![
            Record::new().with("quantity", 5i64).with("reorder_level", 10i64),
            Record::new().with("quantity", 10i64).with("reorder_level", 10i64),
            Record::new().with("quantity", 11i64).with("reorder_level", 10i64),
            Record::new().with("quantity", 1i64),
        ];
        let stats = aggregate(&records, &[Aggregate::CountAtMost { name: "low", field: "quantity", limit_field: "reorder_level" }]);
        assert_eq!(stats["low"], 2.0);
    }

    #[test]
    fn urgency_breakpoints_are_strict() {
        assert_eq!(UrgencyTier::classify(8.0, 10.0), UrgencyTier::High);
        assert_eq!(UrgencyTier::classify(9.0, 10.0), UrgencyTier::Critical);
        assert_eq!(UrgencyTier::classify(5.0, 10.0), UrgencyTier::Medium);
        assert_eq!(UrgencyTier::classify(6.0, 10.0), UrgencyTier::High);
        assert_eq!(UrgencyTier::classify(3.0, 0.0), UrgencyTier::Critical);
        assert_eq!(UrgencyTier::classify(0.0, 0.0), UrgencyTier::Medium);
    }

    #[test]
    fn percentage_guards_zero_total() {
        assert_eq!(percentage_of_total(25.0, 0.0), 0.0);
        assert_eq!(percentage_of_total(1.0, 3.0), 33.3);
        assert_eq!(percentage_of_total(2.0, 3.0), 66.7);
    }
}
