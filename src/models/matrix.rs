//! Drop matrix shapes.

use serde::{Deserialize, Serialize};

use super::{Server, TimeRange};

/// One materialised matrix cell: total `quantity` of `item_id` and total
/// report `times` for `stage_id` during the range `range_id`. Ad-hoc cells
/// (`range_id == 0`) carry the range descriptor inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropMatrixElement {
    pub server: Server,

    #[serde(rename = "stageId")]
    pub stage_id: i32,

    #[serde(rename = "itemId")]
    pub item_id: i32,

    #[serde(rename = "rangeId")]
    pub range_id: i32,

    pub quantity: i64,

    pub times: i64,

    #[serde(rename = "timeRange", skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

/// A matrix cell with its time range resolved, as returned by queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneDropMatrixElement {
    #[serde(rename = "stageId")]
    pub stage_id: i32,

    #[serde(rename = "itemId")]
    pub item_id: i32,

    pub quantity: i64,

    pub times: i64,

    #[serde(rename = "timeRange")]
    pub time_range: TimeRange,
}

/// A drop matrix query result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropMatrixQueryResult {
    pub matrix: Vec<OneDropMatrixElement>,
}
