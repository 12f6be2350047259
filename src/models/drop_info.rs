//! Drop info reference data: which items may drop at which stage during
//! which time range.

use serde::{Deserialize, Serialize};

use super::Server;

/// How an item drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DropType {
    Regular,
    Special,
    Extra,
    Furniture,
    Recognition,
}

/// Expected per-clear drop quantity bounds. Also serves as the stationarity
/// marker: a bounds change across consecutive ranges is a regime change for
/// max-accumulable chain computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: i32,
    pub upper: i32,
}

/// One drop info row: item `item_id` may drop at `stage_id` during the range
/// `range_id`, on `server`. Rows with `item_id == None` carry stage-level
/// metadata only and never contribute to expected item sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropInfo {
    #[serde(rename = "dropId")]
    pub drop_id: i64,

    pub server: Server,

    #[serde(rename = "stageId")]
    pub stage_id: i32,

    #[serde(rename = "itemId")]
    pub item_id: Option<i32>,

    #[serde(rename = "rangeId")]
    pub range_id: i32,

    #[serde(rename = "dropType")]
    pub drop_type: DropType,

    pub bounds: Option<Bounds>,
}

impl DropInfo {
    pub fn new(
        drop_id: i64,
        server: Server,
        stage_id: i32,
        item_id: Option<i32>,
        range_id: i32,
    ) -> Self {
        Self {
            drop_id,
            server,
            stage_id,
            item_id,
            range_id,
            drop_type: DropType::Regular,
            bounds: None,
        }
    }

    pub fn with_bounds(mut self, lower: i32, upper: i32) -> Self {
        self.bounds = Some(Bounds { lower, upper });
        self
    }
}
