use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cost::Cost;
use super::record::UsageRecord;

/// Number of points shown in the recent-usage chart.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Aggregate statistics over the whole ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub total_cost: Cost,
    pub total_tokens: u64,
    pub total_calls: u64,
    pub average_tokens_per_call: u64,
}

impl UsageStats {
    /// Derive statistics from records; an empty slice yields all zeros.
    #[must_use]
    pub fn from_records(records: &[UsageRecord]) -> Self {
        let total_cost = records.iter().map(UsageRecord::cost).sum();
        let total_tokens: u64 = records
            .iter()
            .map(|record| u64::from(record.total_tokens()))
            .sum();
        let total_calls = records.len() as u64;

        Self {
            total_cost,
            total_tokens,
            total_calls,
            average_tokens_per_call: rounded_average(total_tokens, total_calls),
        }
    }
}

// Half-up, matching `Math.round` for non-negative values.
fn rounded_average(total: u64, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    let total = u128::from(total);
    let count = u128::from(count);
    let avg = (2 * total + count) / (2 * count);
    u64::try_from(avg).unwrap_or(u64::MAX)
}

/// One point in the recent-usage time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsagePoint {
    pub timestamp: i64,
    pub tokens: u32,
    pub cost: Cost,
}

impl UsagePoint {
    /// Wall-clock label (`HH:MM:SS`, UTC) for the point's timestamp.
    #[must_use]
    pub fn time_label(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
            .map_or_else(|| "--:--:--".to_string(), |at| at.format("%H:%M:%S").to_string())
    }
}

/// The last `limit` records as chart points, oldest first.
#[must_use]
pub fn recent_series(records: &[UsageRecord], limit: usize) -> Vec<UsagePoint> {
    let start = records.len().saturating_sub(limit);
    records[start..]
        .iter()
        .map(|record| UsagePoint {
            timestamp: record.timestamp(),
            tokens: record.total_tokens(),
            cost: record.cost(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TokenUsage;

    fn record(total: u32, cost_units: u64, timestamp: i64) -> UsageRecord {
        UsageRecord::new(
            TokenUsage::with_total(total, 0, total),
            "gpt-4",
            Cost::from_ten_thousandths(cost_units),
            timestamp,
        )
    }

    #[test]
    fn empty_ledger_yields_zeroes() {
        assert_eq!(UsageStats::from_records(&[]), UsageStats::default());
    }

    #[test]
    fn averages_round_half_up() {
        let stats = UsageStats::from_records(&[record(1500, 13, 1), record(300, 120, 2)]);
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_tokens, 1800);
        assert_eq!(stats.average_tokens_per_call, 900);
        assert_eq!(stats.total_cost, Cost::from_ten_thousandths(133));

        let odd = UsageStats::from_records(&[record(1, 0, 1), record(2, 0, 2)]);
        assert_eq!(odd.average_tokens_per_call, 2);
    }

    #[test]
    fn recent_series_keeps_the_newest_points_in_order() {
        let records: Vec<_> = (0..15)
            .map(|i| record(i, u64::from(i) * 3, i64::from(i)))
            .collect();
        let series = recent_series(&records, DEFAULT_RECENT_LIMIT);
        assert_eq!(series.len(), 10);
        assert_eq!(series.first().map(|p| p.tokens), Some(5));
        assert_eq!(series.last().map(|p| p.tokens), Some(14));
        assert_eq!(
            series.last().map(|p| p.cost),
            Some(Cost::from_ten_thousandths(42))
        );

        assert_eq!(recent_series(&records[..3], DEFAULT_RECENT_LIMIT).len(), 3);
    }

    #[test]
    fn time_label_formats_utc() {
        let point = UsagePoint {
            timestamp: 1_700_000_000_000,
            tokens: 1,
            cost: Cost::ZERO,
        };
        assert_eq!(point.time_label(), "22:13:20");
    }
}
