use std::cmp::Ordering;

use crate::model::Record;

/// `max(id) + 1`, or 1 for an empty collection. Recomputed from the data on
/// every insert, so deleted ids are never handed out again unless they were
/// the maximum.
pub fn next_id<T: Record>(records: &[T]) -> i64 {
    records.iter().map(Record::id).max().unwrap_or(0) + 1
}

fn year_key(year: &str) -> i64 {
    year.trim().parse().unwrap_or(0)
}

pub fn year_then_month(a: &impl Record, b: &impl Record) -> Ordering {
    year_key(b.year())
        .cmp(&year_key(a.year()))
        .then_with(|| a.month().cmp(&b.month()))
}

/// Most recent year first, months ascending within a year. Stable.
pub fn sort_by_year_then_month<T: Record>(records: &mut [T]) {
    records.sort_by(|a, b| year_then_month(a, b));
}
