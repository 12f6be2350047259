//! Outward projection of internal results to the public wire format.
//!
//! Resolves numeric ids to external string ids, applies the closed-zone view
//! and the comma-delimited id filters, reshapes timestamps to unix
//! milliseconds, and replaces the fake end time with a null end time. An
//! unresolved id is fatal for the whole query: it indicates reference data
//! inconsistency, never a skippable row.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    DropMatrixQueryResult, PatternMatrixQueryResult, TimeRange, TrendQueryResult,
    FAKE_END_TIME_MILLI,
};
use crate::repo::{ItemRepo, StageRepo};

/// Errors raised while projecting a result outward.
#[derive(Debug, Error)]
pub enum ShimError {
    #[error("unresolved stage id {0}")]
    UnresolvedStage(i32),

    #[error("unresolved item id {0}")]
    UnresolvedItem(i32),

    #[error("pattern element for range {0} is missing its time range")]
    MissingTimeRange(i32),
}

// ── Wire shapes ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimDropMatrixElement {
    #[serde(rename = "stageId")]
    pub stage_id: String,

    #[serde(rename = "itemId")]
    pub item_id: String,

    pub quantity: i64,

    pub times: i64,

    #[serde(rename = "start")]
    pub start_time: u64,

    /// `None` encodes an open-ended range.
    #[serde(rename = "end")]
    pub end_time: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimDropMatrixQueryResult {
    pub matrix: Vec<ShimDropMatrixElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimOneItemTrend {
    pub quantity: Vec<i64>,
    pub times: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimStageTrend {
    #[serde(rename = "startTime")]
    pub start_time: u64,

    pub results: std::collections::BTreeMap<String, ShimOneItemTrend>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimTrendQueryResult {
    pub trend: std::collections::BTreeMap<String, ShimStageTrend>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimPatternEntry {
    #[serde(rename = "itemId")]
    pub item_id: String,

    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimPattern {
    #[serde(rename = "patternId")]
    pub pattern_id: String,

    pub drops: Vec<ShimPatternEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimPatternMatrixElement {
    #[serde(rename = "stageId")]
    pub stage_id: String,

    pub pattern: ShimPattern,

    pub quantity: i64,

    pub times: i64,

    #[serde(rename = "start")]
    pub start_time: u64,

    #[serde(rename = "end")]
    pub end_time: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimPatternMatrixQueryResult {
    #[serde(rename = "patternMatrix")]
    pub pattern_matrix: Vec<ShimPatternMatrixElement>,
}

// ── Projection ──────────────────────────────────────────────────

fn shim_times(range: &TimeRange) -> (u64, Option<u64>) {
    let start = range.start_time.timestamp_millis().max(0) as u64;
    let end_millis = range.end_time.timestamp_millis();
    let end = if end_millis == FAKE_END_TIME_MILLI {
        None
    } else {
        Some(end_millis.max(0) as u64)
    };
    (start, end)
}

fn parse_id_filter(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

/// The shim layer: translates internal results to wire shapes.
pub struct Shim {
    stage_repo: Arc<dyn StageRepo>,
    item_repo: Arc<dyn ItemRepo>,
}

impl Shim {
    pub fn new(stage_repo: Arc<dyn StageRepo>, item_repo: Arc<dyn ItemRepo>) -> Self {
        Self {
            stage_repo,
            item_repo,
        }
    }

    async fn ark_stage_id(&self, stage_id: i32) -> Result<String, ShimError> {
        self.stage_repo
            .get_by_id(stage_id)
            .await
            .map(|stage| stage.ark_stage_id)
            .map_err(|_| ShimError::UnresolvedStage(stage_id))
    }

    async fn ark_item_id(&self, item_id: i32) -> Result<String, ShimError> {
        self.item_repo
            .get_by_id(item_id)
            .await
            .map(|item| item.ark_item_id)
            .map_err(|_| ShimError::UnresolvedItem(item_id))
    }

    /// Project a drop matrix result. `opening_stage_ids = Some(set)` applies
    /// the closed-zone view (rows for stages outside the set are dropped);
    /// `None` keeps every row. The filter strings are comma-delimited
    /// external ids; empty means no restriction.
    pub async fn apply_drop_matrix(
        &self,
        result: &DropMatrixQueryResult,
        opening_stage_ids: Option<&BTreeSet<i32>>,
        stage_filter: &str,
        item_filter: &str,
    ) -> Result<ShimDropMatrixQueryResult, ShimError> {
        let stage_filter_set = parse_id_filter(stage_filter);
        let item_filter_set = parse_id_filter(item_filter);

        let mut matrix = Vec::with_capacity(result.matrix.len());
        for el in &result.matrix {
            if let Some(open) = opening_stage_ids {
                if !open.contains(&el.stage_id) {
                    continue;
                }
            }

            let ark_stage_id = self.ark_stage_id(el.stage_id).await?;
            if !stage_filter_set.is_empty() && !stage_filter_set.contains(&ark_stage_id) {
                continue;
            }

            let ark_item_id = self.ark_item_id(el.item_id).await?;
            if !item_filter_set.is_empty() && !item_filter_set.contains(&ark_item_id) {
                continue;
            }

            let (start_time, end_time) = shim_times(&el.time_range);
            matrix.push(ShimDropMatrixElement {
                stage_id: ark_stage_id,
                item_id: ark_item_id,
                quantity: el.quantity,
                times: el.times,
                start_time,
                end_time,
            });
        }
        Ok(ShimDropMatrixQueryResult { matrix })
    }

    /// Project a trend result.
    pub async fn apply_trend(
        &self,
        result: &TrendQueryResult,
    ) -> Result<ShimTrendQueryResult, ShimError> {
        let mut trend = std::collections::BTreeMap::new();
        for (stage_id, stage_trend) in &result.trend {
            let ark_stage_id = self.ark_stage_id(*stage_id).await?;

            let mut results = std::collections::BTreeMap::new();
            for (item_id, item_trend) in &stage_trend.results {
                let ark_item_id = self.ark_item_id(*item_id).await?;
                results.insert(
                    ark_item_id,
                    ShimOneItemTrend {
                        quantity: item_trend.quantity.clone(),
                        times: item_trend.times.clone(),
                    },
                );
            }

            trend.insert(
                ark_stage_id,
                ShimStageTrend {
                    start_time: stage_trend.start_time.timestamp_millis().max(0) as u64,
                    results,
                },
            );
        }
        Ok(ShimTrendQueryResult { trend })
    }

    /// Project a pattern matrix result. Every element must carry its
    /// resolved time range.
    pub async fn apply_pattern_matrix(
        &self,
        result: &PatternMatrixQueryResult,
        opening_stage_ids: Option<&BTreeSet<i32>>,
    ) -> Result<ShimPatternMatrixQueryResult, ShimError> {
        let mut pattern_matrix = Vec::with_capacity(result.pattern_matrix.len());
        for el in &result.pattern_matrix {
            if let Some(open) = opening_stage_ids {
                if !open.contains(&el.stage_id) {
                    continue;
                }
            }

            let range = el
                .time_range
                .as_ref()
                .ok_or(ShimError::MissingTimeRange(el.range_id))?;

            let ark_stage_id = self.ark_stage_id(el.stage_id).await?;
            let mut drops = Vec::with_capacity(el.pattern.drops.len());
            for entry in &el.pattern.drops {
                drops.push(ShimPatternEntry {
                    item_id: self.ark_item_id(entry.item_id).await?,
                    quantity: entry.quantity,
                });
            }

            let (start_time, end_time) = shim_times(range);
            pattern_matrix.push(ShimPatternMatrixElement {
                stage_id: ark_stage_id,
                pattern: ShimPattern {
                    pattern_id: el.pattern.pattern_id(),
                    drops,
                },
                quantity: el.quantity,
                times: el.times,
                start_time,
                end_time,
            });
        }
        Ok(ShimPatternMatrixQueryResult { pattern_matrix })
    }
}
