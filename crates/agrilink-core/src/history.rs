//! Bounded per-entity time series.
//!
//! Each entity owns one append-only series capped at [`HISTORY_CAPACITY`]
//! points with strict FIFO eviction. Queries select a lookback window and
//! reduce the result to at most N points by positional decimation (keeping
//! every stride-th point, no averaging), so long windows may show gaps
//! rather than smoothed trends.

use crate::model::HistoryPoint;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;

/// Maximum number of points retained per entity.
pub const HISTORY_CAPACITY: usize = 1000;

/// Lookback window of a history query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Period {
    /// The window length this period spans.
    pub fn window(self) -> Duration {
        match self {
            Period::TenMinutes => Duration::minutes(10),
            Period::OneHour => Duration::hours(1),
            Period::SixHours => Duration::hours(6),
            Period::Day => Duration::hours(24),
            Period::Week => Duration::days(7),
            Period::Month => Duration::days(30),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::TenMinutes => "10m",
            Period::OneHour => "1h",
            Period::SixHours => "6h",
            Period::Day => "24h",
            Period::Week => "7d",
            Period::Month => "30d",
        }
    }
}

/// Error for unknown period names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown period '{0}', expected one of 10m, 1h, 6h, 24h, 7d, 30d")]
pub struct PeriodParseError(String);

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10m" => Ok(Period::TenMinutes),
            "1h" => Ok(Period::OneHour),
            "6h" => Ok(Period::SixHours),
            "24h" => Ok(Period::Day),
            "7d" => Ok(Period::Week),
            "30d" => Ok(Period::Month),
            other => Err(PeriodParseError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bounded in-memory history for all entities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryStore {
    series: HashMap<String, VecDeque<HistoryPoint>>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point, evicting the oldest when at capacity.
    pub fn append(&mut self, entity_id: &str, point: HistoryPoint) {
        let series = self.series.entry(entity_id.to_string()).or_default();
        if series.len() == HISTORY_CAPACITY {
            series.pop_front();
        }
        series.push_back(point);
    }

    /// Points within the lookback window ending at `now`, in insertion
    /// (chronological) order, decimated to at most `max_points`.
    pub fn query(
        &self,
        entity_id: &str,
        period: Period,
        max_points: usize,
        now: DateTime<Utc>,
    ) -> Vec<HistoryPoint> {
        let Some(series) = self.series.get(entity_id) else {
            return Vec::new();
        };

        if max_points == 0 {
            return Vec::new();
        }

        let cutoff = now - period.window();
        let windowed: Vec<HistoryPoint> = series
            .iter()
            .filter(|p| p.timestamp >= cutoff)
            .copied()
            .collect();

        if windowed.len() <= max_points {
            return windowed;
        }

        let stride = windowed.len().div_ceil(max_points);
        windowed
            .into_iter()
            .step_by(stride)
            .collect()
    }

    /// Number of retained points for an entity.
    pub fn len(&self, entity_id: &str) -> usize {
        self.series.get(entity_id).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(VecDeque::is_empty)
    }

    /// Drop an entity's series entirely.
    pub fn remove(&mut self, entity_id: &str) {
        self.series.remove(entity_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(now: DateTime<Utc>, secs_ago: i64, value: f64) -> HistoryPoint {
        HistoryPoint {
            timestamp: now - Duration::seconds(secs_ago),
            value,
            received_at: None,
        }
    }

    #[test]
    fn test_capacity_fifo_eviction() {
        let now = Utc::now();
        let mut store = HistoryStore::new();

        for i in 0..(HISTORY_CAPACITY + 50) {
            store.append("s1", point(now, (HISTORY_CAPACITY + 50 - i) as i64, i as f64));
        }

        assert_eq!(store.len("s1"), HISTORY_CAPACITY);

        // Oldest 50 points were evicted first.
        let points = store.query("s1", Period::Month, usize::MAX, now);
        assert_eq!(points.first().unwrap().value, 50.0);
        assert_eq!(points.last().unwrap().value, (HISTORY_CAPACITY + 49) as f64);
    }

    #[test]
    fn test_query_window_filter() {
        let now = Utc::now();
        let mut store = HistoryStore::new();

        store.append("s1", point(now, 2 * 3600, 1.0)); // outside 1h
        store.append("s1", point(now, 30 * 60, 2.0));
        store.append("s1", point(now, 60, 3.0));

        let points = store.query("s1", Period::OneHour, 50, now);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].value, 2.0);
        assert_eq!(points[1].value, 3.0);
    }

    #[test]
    fn test_query_decimation_stride() {
        let now = Utc::now();
        let mut store = HistoryStore::new();

        // 10 points, max 4 -> stride ceil(10/4) = 3 -> indices 0, 3, 6, 9
        for i in 0..10 {
            store.append("s1", point(now, 10 - i, i as f64));
        }

        let points = store.query("s1", Period::OneHour, 4, now);
        let values: Vec<f64> = points.iter().map(|p| p.value).collect();
        assert_eq!(values, vec![0.0, 3.0, 6.0, 9.0]);
        assert!(points.len() <= 4);
    }

    #[test]
    fn test_query_zero_max_points_is_empty() {
        let now = Utc::now();
        let mut store = HistoryStore::new();
        store.append("s1", point(now, 1, 1.0));
        store.append("s1", point(now, 2, 2.0));

        // The result never exceeds max_points, including the zero edge.
        assert!(store.query("s1", Period::OneHour, 0, now).is_empty());
    }

    #[test]
    fn test_query_unknown_entity_is_empty() {
        let store = HistoryStore::new();
        assert!(store.query("nope", Period::Day, 10, Utc::now()).is_empty());
    }

    #[test]
    fn test_remove_drops_series() {
        let now = Utc::now();
        let mut store = HistoryStore::new();
        store.append("s1", point(now, 1, 1.0));
        store.remove("s1");
        assert_eq!(store.len("s1"), 0);
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!("10m".parse::<Period>().unwrap(), Period::TenMinutes);
        assert_eq!("30d".parse::<Period>().unwrap(), Period::Month);
        assert!("2h".parse::<Period>().is_err());
        assert_eq!(Period::Week.to_string(), "7d");
    }
}
