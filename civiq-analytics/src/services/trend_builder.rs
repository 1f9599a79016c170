//! Participation Trend Builder
//!
//! Buckets a poll's analytics-record timestamps into a daily time series
//! over a fixed 30-day lookback window. Dates are the UTC calendar date
//! taken by truncating the stored RFC 3339 timestamp to its date
//! component -- never a local-timezone conversion. Days with no records
//! are not synthesized; callers must handle gaps.

use crate::store::CivicStore;
use chrono::{Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Lookback window for the daily trend
pub const TREND_LOOKBACK_DAYS: i64 = 30;

/// One day's participation count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    /// UTC calendar date, `YYYY-MM-DD`
    pub date: String,
    pub count: u64,
}

pub struct TrendBuilder {
    store: CivicStore,
}

impl TrendBuilder {
    pub fn new(store: CivicStore) -> Self {
        Self { store }
    }

    /// Daily participation counts for the last 30 days, ascending by date.
    /// Degrades to an empty series when the record set is unreadable.
    pub async fn daily_trend(&self, poll_id: &str) -> Vec<DailyCount> {
        let since = (Utc::now() - Duration::days(TREND_LOOKBACK_DAYS))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let records = match self.store.analytics_records_for_poll(poll_id, Some(&since)).await {
            Ok(records) => records,
            Err(e) => {
                warn!(poll_id, error = %e, "trend query failed, returning empty series");
                return Vec::new();
            }
        };

        bucket_by_date(records.iter().map(|r| r.calculated_at.as_str()))
    }
}

/// Group RFC 3339 timestamps by their date component and count per date.
/// Output is sorted ascending and sparse.
fn bucket_by_date<'a>(timestamps: impl Iterator<Item = &'a str>) -> Vec<DailyCount> {
    let mut buckets: BTreeMap<String, u64> = BTreeMap::new();
    for ts in timestamps {
        // Truncate "2025-01-01T12:34:56Z" to "2025-01-01"; a timestamp with
        // no time component is already a date
        let date = ts.split('T').next().unwrap_or(ts);
        if date.is_empty() {
            continue;
        }
        *buckets.entry(date.to_string()).or_insert(0) += 1;
    }
    buckets.into_iter().map(|(date, count)| DailyCount { date, count }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_are_not_zero_filled() {
        let timestamps = [
            "2025-01-01T08:00:00Z",
            "2025-01-01T19:30:00Z",
            "2025-01-03T11:00:00Z",
        ];
        let trend = bucket_by_date(timestamps.iter().copied());

        assert_eq!(
            trend,
            vec![
                DailyCount { date: "2025-01-01".to_string(), count: 2 },
                DailyCount { date: "2025-01-03".to_string(), count: 1 },
            ]
        );
    }

    #[test]
    fn output_is_sorted_ascending_by_date() {
        let timestamps = ["2025-02-10T00:00:00Z", "2025-01-31T23:59:59Z", "2025-02-01T00:00:00Z"];
        let trend = bucket_by_date(timestamps.iter().copied());
        let dates: Vec<&str> = trend.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-01-31", "2025-02-01", "2025-02-10"]);
    }

    #[test]
    fn date_is_utc_truncation_not_local() {
        // A late-evening UTC timestamp stays on its UTC date regardless of
        // the host timezone
        let trend = bucket_by_date(["2025-06-30T23:59:00Z"].into_iter());
        assert_eq!(trend[0].date, "2025-06-30");
    }

    #[test]
    fn empty_input_yields_empty_series() {
        let trend = bucket_by_date(std::iter::empty());
        assert!(trend.is_empty());
    }
}
