use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::reports::filters::Period;

pub const TOP_N: usize = 10;
pub const UNKNOWN_BUCKET: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub count: u64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBucket {
    pub period: String,
    pub count: u64,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountBucket {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodCount {
    pub period: String,
    pub count: u64,
}

fn bucket_key(raw: Option<String>) -> String {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN_BUCKET.to_string())
}

/// Count and sum per categorical key, ordered by key.
pub fn group_totals<T, K, A>(records: &[T], key: K, amount: A) -> Vec<Bucket>
where
    K: Fn(&T) -> Option<String>,
    A: Fn(&T) -> f64,
{
    let mut totals: BTreeMap<String, (u64, i64)> = BTreeMap::new();
    for record in records {
        let entry = totals.entry(bucket_key(key(record))).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += to_cents(amount(record));
    }

    totals
        .into_iter()
        .map(|(key, (count, cents))| Bucket {
            key,
            count,
            amount: from_cents(cents),
        })
        .collect()
}

/// Occurrences per categorical key, ordered by key.
pub fn count_by<T, K>(records: &[T], key: K) -> Vec<CountBucket>
where
    K: Fn(&T) -> Option<String>,
{
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        *counts.entry(bucket_key(key(record))).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(key, count)| CountBucket { key, count })
        .collect()
}

pub fn period_key(instant: DateTime<Utc>, period: Period) -> String {
    let date = instant.date_naive();
    match period {
        Period::Daily => date.format("%Y-%m-%d").to_string(),
        Period::Weekly => {
            let week_start =
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
            week_start.format("%Y-%m-%d").to_string()
        }
        Period::Monthly => format!("{:04}-{:02}", date.year(), date.month()),
    }
}

/// Count and sum per period bucket, ascending by bucket key.
pub fn time_series<T, D, A>(records: &[T], period: Period, timestamp: D, amount: A) -> Vec<PeriodBucket>
where
    D: Fn(&T) -> DateTime<Utc>,
    A: Fn(&T) -> f64,
{
    let mut buckets: BTreeMap<String, (u64, i64)> = BTreeMap::new();
    for record in records {
        let entry = buckets
            .entry(period_key(timestamp(record), period))
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += to_cents(amount(record));
    }

    buckets
        .into_iter()
        .map(|(period, (count, cents))| PeriodBucket {
            period,
            count,
            amount: from_cents(cents),
        })
        .collect()
}

pub fn count_series<T, D>(records: &[T], period: Period, timestamp: D) -> Vec<PeriodCount>
where
    D: Fn(&T) -> DateTime<Utc>,
{
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        *buckets
            .entry(period_key(timestamp(record), period))
            .or_insert(0) += 1;
    }
    buckets
        .into_iter()
        .map(|(period, count)| PeriodCount { period, count })
        .collect()
}

/// Highest `n` items by `metric`. Equal metrics keep their input order.
pub fn top_n<T, M>(mut items: Vec<T>, metric: M, n: usize) -> Vec<T>
where
    M: Fn(&T) -> f64,
{
    items.sort_by(|left, right| {
        metric(right)
            .partial_cmp(&metric(left))
            .unwrap_or(Ordering::Equal)
    });
    items.truncate(n);
    items
}

/// Percentage of `part` in `total`; 0 when there is nothing to measure.
pub fn success_rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

/// Percentage change from `previous` to `current`; `None` when `previous` is 0.
pub fn growth_rate(current: f64, previous: f64) -> Option<f64> {
    if previous == 0.0 || !previous.is_finite() || !current.is_finite() {
        return None;
    }
    Some(round2((current - previous) / previous * 100.0))
}

pub fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    round2(total / count as f64)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Money sums accumulate in whole cents so a total and its buckets agree exactly.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}
