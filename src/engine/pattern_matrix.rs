//! Pattern matrix engine: per-stage frequency of co-occurring item sets.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheContext, CacheSet};
use crate::models::{Account, OnePatternMatrixElement, PatternMatrixQueryResult, Server};
use crate::repo::DropReportQuery;
use crate::shim::{Shim, ShimPatternMatrixQueryResult};

use super::drop_info::DropInfoService;
use super::time_range::TimeRangeService;
use super::EngineError;

/// TTL of cached pattern matrix results.
const PATTERN_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct PatternMatrixService {
    time_range: Arc<TimeRangeService>,
    drop_info: Arc<DropInfoService>,
    reports: Arc<dyn DropReportQuery>,
    shim: Arc<Shim>,
    shim_cache: CacheSet<ShimPatternMatrixQueryResult>,
    /// Patterns below this occurrence count are hidden unless the caller
    /// asks for all patterns. Zero includes everything.
    quantity_threshold: i64,
}

impl PatternMatrixService {
    pub fn new(
        time_range: Arc<TimeRangeService>,
        drop_info: Arc<DropInfoService>,
        reports: Arc<dyn DropReportQuery>,
        shim: Arc<Shim>,
        caches: &CacheContext,
        quantity_threshold: i64,
    ) -> Self {
        Self {
            time_range,
            drop_info,
            reports,
            shim,
            shim_cache: caches.mirrored_set("shim_pattern_matrix"),
            quantity_threshold,
        }
    }

    /// The pattern matrix, shimmed for the wire. Cached per
    /// `(server, show_closed_zones, show_all_patterns)` for anonymous
    /// queries.
    pub async fn get_shim_pattern_matrix(
        &self,
        server: Server,
        account: Account,
        show_closed_zones: bool,
        show_all_patterns: bool,
    ) -> Result<ShimPatternMatrixQueryResult, EngineError> {
        if account.is_known() {
            return self
                .shim_pattern_matrix(server, account, show_closed_zones, show_all_patterns)
                .await;
        }

        let key = format!("{}|{}|{}", server, show_closed_zones, show_all_patterns);
        let (computed, result) = self
            .shim_cache
            .mutex_get_set(
                &key,
                || async {
                    self.shim_pattern_matrix(server, account, show_closed_zones, show_all_patterns)
                        .await
                },
                PATTERN_RESULT_TTL,
            )
            .await?;
        if computed {
            debug!(%server, show_all_patterns, "recomputed pattern matrix");
        }
        Ok(result)
    }

    /// When the cached pattern view was last recomputed, if it is cached.
    pub async fn result_last_modified(
        &self,
        server: Server,
        show_closed_zones: bool,
        show_all_patterns: bool,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        let key = format!("{}|{}|{}", server, show_closed_zones, show_all_patterns);
        self.shim_cache.last_modified(&key).await
    }

    async fn shim_pattern_matrix(
        &self,
        server: Server,
        account: Account,
        show_closed_zones: bool,
        show_all_patterns: bool,
    ) -> Result<ShimPatternMatrixQueryResult, EngineError> {
        let mut result = self.calc_pattern_matrix(server, account).await?;
        if !show_all_patterns && self.quantity_threshold > 0 {
            result
                .pattern_matrix
                .retain(|el| el.quantity >= self.quantity_threshold);
        }

        let opening = if show_closed_zones {
            None
        } else {
            Some(self.drop_info.opening_stage_ids(server).await?)
        };
        Ok(self
            .shim
            .apply_pattern_matrix(&result, opening.as_ref())
            .await?)
    }

    /// Compute patterns for every `(stage, range)` appearing in the server's
    /// max-accumulable chains. Each element's `times` is the stage's report
    /// count within that range.
    pub(crate) async fn calc_pattern_matrix(
        &self,
        server: Server,
        account: Account,
    ) -> Result<PatternMatrixQueryResult, EngineError> {
        let chains = self
            .time_range
            .max_accumulable_time_ranges_by_server(server)
            .await?;

        let mut stages_by_range: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
        for (stage_id, items) in &chains {
            for ranges in items.values() {
                for range in ranges {
                    stages_by_range
                        .entry(range.range_id)
                        .or_default()
                        .insert(*stage_id);
                }
            }
        }

        let mut pattern_matrix = Vec::new();
        for (range_id, stages) in stages_by_range {
            let range = self.time_range.time_range_by_id(range_id).await?;
            let stage_ids: Vec<i32> = stages.into_iter().collect();

            let times: BTreeMap<i32, i64> = self
                .reports
                .total_times(server, &range, &stage_ids, account)
                .await?
                .into_iter()
                .map(|t| (t.stage_id, t.total_times))
                .collect();

            let rows = self
                .reports
                .pattern_groups(server, &range, &stage_ids, account)
                .await?;
            for row in rows {
                let stage_times = times.get(&row.stage_id).copied().unwrap_or(0);
                pattern_matrix.push(OnePatternMatrixElement {
                    stage_id: row.stage_id,
                    pattern: row.pattern,
                    range_id,
                    quantity: row.count,
                    times: stage_times,
                    time_range: Some(range.clone()),
                });
            }
        }

        pattern_matrix.sort_by(|a, b| {
            (a.stage_id, a.range_id, &a.pattern).cmp(&(b.stage_id, b.range_id, &b.pattern))
        });
        Ok(PatternMatrixQueryResult { pattern_matrix })
    }
}
