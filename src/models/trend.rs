//! Trend shapes: per-stage time-bucketed series.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parallel per-bucket series for one item at one stage. `quantity` and
/// `times` always have the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneItemTrend {
    pub quantity: Vec<i64>,
    pub times: Vec<i64>,
}

/// Bucketed series for one stage, anchored at `start_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTrend {
    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,

    /// Keyed by internal item id.
    pub results: BTreeMap<i32, OneItemTrend>,
}

/// A trend query result, keyed by internal stage id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendQueryResult {
    pub trend: BTreeMap<i32, StageTrend>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trend_series_parallel_lengths() {
        let trend = OneItemTrend {
            quantity: vec![1, 2, 3],
            times: vec![10, 10, 10],
        };
        assert_eq!(trend.quantity.len(), trend.times.len());
    }

    #[test]
    fn test_stage_trend_serialization() {
        let mut results = BTreeMap::new();
        results.insert(
            3,
            OneItemTrend {
                quantity: vec![1],
                times: vec![2],
            },
        );
        let trend = StageTrend {
            start_time: Utc.timestamp_millis_opt(0).unwrap(),
            results,
        };
        let json = serde_json::to_string(&trend).unwrap();
        let parsed: StageTrend = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, trend);
    }
}
