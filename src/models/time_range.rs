//! Time ranges.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::Server;

/// Sentinel end time (unix milliseconds) meaning "open-ended range". Matches
/// the upstream database convention; the shim layer turns it into a null end
/// time on the wire.
pub const FAKE_END_TIME_MILLI: i64 = 62_135_596_800_000;

/// Range id reserved for ad-hoc ranges that are not persisted.
pub const AD_HOC_RANGE_ID: i32 = 0;

/// A wall-clock interval `[start_time, end_time)` labelled by a numeric id.
/// `range_id == 0` marks an ad-hoc range supplied by a caller rather than one
/// loaded from the reference store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(rename = "rangeId")]
    pub range_id: i32,

    pub server: Server,

    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,

    #[serde(rename = "endTime")]
    pub end_time: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(
        range_id: i32,
        server: Server,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            range_id,
            server,
            start_time,
            end_time,
        }
    }

    /// An ad-hoc range (`range_id == 0`).
    pub fn ad_hoc(server: Server, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self::new(AD_HOC_RANGE_ID, server, start_time, end_time)
    }

    /// An open-ended range, terminated by the fake end time sentinel.
    pub fn open_ended(range_id: i32, server: Server, start_time: DateTime<Utc>) -> Self {
        Self::new(range_id, server, start_time, fake_end_time())
    }

    pub fn is_ad_hoc(&self) -> bool {
        self.range_id == AD_HOC_RANGE_ID
    }

    pub fn is_open_ended(&self) -> bool {
        self.end_time.timestamp_millis() == FAKE_END_TIME_MILLI
    }

    /// Whether `at` falls inside `[start_time, end_time)`.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at < self.end_time
    }

    /// Whether two ranges intersect.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// The fake end time as a `DateTime<Utc>`.
pub fn fake_end_time() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(FAKE_END_TIME_MILLI).unwrap()
}
