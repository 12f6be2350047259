//! Drop matrix engine.
//!
//! Four entry points:
//!
//! 1. Global, max-accumulable: read persisted elements, fold them over the
//!    max-accumulable grouping. Cached per `(server, show_closed_zones)`
//!    when unfiltered and anonymous.
//! 2. Personal, max-accumulable: recompute elements over the flattened
//!    max-accumulable range list, scoped to the account, then fold.
//! 3. Custom: compute elements for caller-supplied ranges and filters and
//!    emit them as-is.
//! 4. Full refresh: the calculator invoked per persisted range by the
//!    recompute scheduler.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheContext, CacheSet};
use crate::models::{
    Account, DropMatrixElement, DropMatrixQueryResult, OneDropMatrixElement, Server, TimeRange,
};
use crate::repo::{DropMatrixElementRepo, DropReportQuery};
use crate::shim::{Shim, ShimDropMatrixQueryResult};

use super::drop_info::DropInfoService;
use super::time_range::TimeRangeService;
use super::EngineError;

/// TTL of cached max-accumulable matrix results.
const MATRIX_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct DropMatrixService {
    time_range: Arc<TimeRangeService>,
    drop_info: Arc<DropInfoService>,
    reports: Arc<dyn DropReportQuery>,
    elements: Arc<dyn DropMatrixElementRepo>,
    shim: Arc<Shim>,
    shim_cache: CacheSet<ShimDropMatrixQueryResult>,
}

impl DropMatrixService {
    pub fn new(
        time_range: Arc<TimeRangeService>,
        drop_info: Arc<DropInfoService>,
        reports: Arc<dyn DropReportQuery>,
        elements: Arc<dyn DropMatrixElementRepo>,
        shim: Arc<Shim>,
        caches: &CacheContext,
    ) -> Self {
        Self {
            time_range,
            drop_info,
            reports,
            elements,
            shim,
            shim_cache: caches.mirrored_set("shim_max_accumulable_drop_matrix"),
        }
    }

    /// The max-accumulable drop matrix, shimmed for the wire. Cacheable only
    /// for the unfiltered global view.
    pub async fn get_shim_max_accumulable_drop_matrix(
        &self,
        server: Server,
        show_closed_zones: bool,
        stage_filter: &str,
        item_filter: &str,
        account: Account,
    ) -> Result<ShimDropMatrixQueryResult, EngineError> {
        let cacheable = !account.is_known() && stage_filter.is_empty() && item_filter.is_empty();
        if !cacheable {
            return self
                .shim_max_accumulable(server, show_closed_zones, stage_filter, item_filter, account)
                .await;
        }

        let key = format!("{}|{}", server, show_closed_zones);
        let (computed, result) = self
            .shim_cache
            .mutex_get_set(
                &key,
                || async {
                    self.shim_max_accumulable(server, show_closed_zones, "", "", account)
                        .await
                },
                MATRIX_RESULT_TTL,
            )
            .await?;
        if computed {
            debug!(%server, show_closed_zones, "recomputed max-accumulable drop matrix");
        }
        Ok(result)
    }

    /// When the cached global view was last recomputed, if it is cached.
    pub async fn result_last_modified(
        &self,
        server: Server,
        show_closed_zones: bool,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        let key = format!("{}|{}", server, show_closed_zones);
        self.shim_cache.last_modified(&key).await
    }

    /// A customized drop matrix over one caller-supplied range, emitted
    /// without the max-accumulable fold. Never cached.
    pub async fn get_shim_customized_drop_matrix(
        &self,
        server: Server,
        range: &TimeRange,
        stage_ids: &[i32],
        item_ids: &[i32],
        account: Account,
    ) -> Result<ShimDropMatrixQueryResult, EngineError> {
        let elements = self
            .calc_drop_matrix_for_time_ranges(
                server,
                std::slice::from_ref(range),
                Some(stage_ids),
                Some(item_ids),
                account,
            )
            .await?;
        let result = self.convert_elements_to_result(elements).await?;
        Ok(self.shim.apply_drop_matrix(&result, None, "", "").await?)
    }

    async fn shim_max_accumulable(
        &self,
        server: Server,
        show_closed_zones: bool,
        stage_filter: &str,
        item_filter: &str,
        account: Account,
    ) -> Result<ShimDropMatrixQueryResult, EngineError> {
        let result = self.max_accumulable_result(server, account).await?;
        let opening = if show_closed_zones {
            None
        } else {
            Some(self.drop_info.opening_stage_ids(server).await?)
        };
        Ok(self
            .shim
            .apply_drop_matrix(&result, opening.as_ref(), stage_filter, item_filter)
            .await?)
    }

    async fn max_accumulable_result(
        &self,
        server: Server,
        account: Account,
    ) -> Result<DropMatrixQueryResult, EngineError> {
        let elements = if account.is_known() {
            let ranges = self.time_range.flat_max_accumulable_ranges(server).await?;
            self.calc_drop_matrix_for_time_ranges(server, &ranges, None, None, account)
                .await?
        } else {
            self.elements.elements_by_server(server).await?
        };
        self.convert_elements_to_max_accumulable_result(server, elements)
            .await
    }

    /// The calculator: one [`DropMatrixElement`] per observed `(stage, item,
    /// range)` plus a zero-quantity element for every expected item the
    /// range's reports never showed. Within one `(stage, range)` group every
    /// element carries the same stage `times`.
    pub(crate) async fn calc_drop_matrix_for_time_ranges(
        &self,
        server: Server,
        ranges: &[TimeRange],
        stage_filter: Option<&[i32]>,
        item_filter: Option<&[i32]>,
        account: Account,
    ) -> Result<Vec<DropMatrixElement>, EngineError> {
        let drop_infos = self
            .drop_info
            .drop_infos_with_filters(server, ranges, stage_filter, item_filter)
            .await?;

        let mut stage_items: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
        {
            let mut sets: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
            for info in &drop_infos {
                if let Some(item_id) = info.item_id {
                    sets.entry(info.stage_id).or_default().insert(item_id);
                }
            }
            for (stage_id, items) in sets {
                stage_items.insert(stage_id, items.into_iter().collect());
            }
        }
        let stage_ids: Vec<i32> = stage_items.keys().copied().collect();
        if stage_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut elements = Vec::new();
        for range in ranges {
            let quantities = self
                .reports
                .total_quantity(server, range, &stage_items, account)
                .await?;
            let times = self
                .reports
                .total_times(server, range, &stage_ids, account)
                .await?;

            let mut quantity_map: BTreeMap<i32, BTreeMap<i32, i64>> = BTreeMap::new();
            for q in quantities {
                quantity_map
                    .entry(q.stage_id)
                    .or_default()
                    .insert(q.item_id, q.total_quantity);
            }

            // A (stage, range) group exists iff the range produced reports
            // for the stage; all of its elements share the stage's times.
            for t in &times {
                let stage_id = t.stage_id;
                let stage_times = t.total_times;

                let mut expected: BTreeSet<i32> = if range.is_ad_hoc() {
                    self.drop_info
                        .drop_infos_with_filters(
                            server,
                            std::slice::from_ref(range),
                            Some(&[stage_id]),
                            None,
                        )
                        .await?
                        .iter()
                        .filter_map(|info| info.item_id)
                        .collect()
                } else {
                    self.drop_info
                        .item_drop_set(server, stage_id, range.range_id)
                        .await?
                        .into_iter()
                        .collect()
                };
                if let Some(items) = item_filter {
                    if !items.is_empty() {
                        expected.retain(|item_id| items.contains(item_id));
                    }
                }

                if let Some(observed) = quantity_map.get(&stage_id) {
                    for (&item_id, &quantity) in observed {
                        elements.push(Self::element(
                            server,
                            stage_id,
                            item_id,
                            range,
                            quantity,
                            stage_times,
                        ));
                        expected.remove(&item_id);
                    }
                }
                for item_id in expected {
                    elements.push(Self::element(server, stage_id, item_id, range, 0, stage_times));
                }
            }
        }
        Ok(elements)
    }

    fn element(
        server: Server,
        stage_id: i32,
        item_id: i32,
        range: &TimeRange,
        quantity: i64,
        times: i64,
    ) -> DropMatrixElement {
        DropMatrixElement {
            server,
            stage_id,
            item_id,
            range_id: range.range_id,
            quantity,
            times,
            time_range: range.is_ad_hoc().then(|| range.clone()),
        }
    }

    /// Fold elements over the max-accumulable grouping: at most one result
    /// per `(stage, item)`, summing quantities and times across the chain
    /// and widening the time range. Chains with no matching element drop.
    async fn convert_elements_to_max_accumulable_result(
        &self,
        server: Server,
        elements: Vec<DropMatrixElement>,
    ) -> Result<DropMatrixQueryResult, EngineError> {
        let mut elements_map: BTreeMap<i32, BTreeMap<i32, BTreeMap<i32, DropMatrixElement>>> =
            BTreeMap::new();
        for el in elements {
            elements_map
                .entry(el.stage_id)
                .or_default()
                .entry(el.item_id)
                .or_default()
                .insert(el.range_id, el);
        }

        let chains = self
            .time_range
            .max_accumulable_time_ranges_by_server(server)
            .await?;

        let mut matrix = Vec::new();
        for (stage_id, items) in &chains {
            let Some(stage_map) = elements_map.get(stage_id) else {
                continue;
            };
            for (item_id, ranges) in items {
                let Some(range_map) = stage_map.get(item_id) else {
                    continue;
                };

                let mut combined: Option<OneDropMatrixElement> = None;
                for range in ranges {
                    let Some(el) = range_map.get(&range.range_id) else {
                        continue;
                    };
                    let one = OneDropMatrixElement {
                        stage_id: *stage_id,
                        item_id: *item_id,
                        quantity: el.quantity,
                        times: el.times,
                        time_range: TimeRange::ad_hoc(server, range.start_time, range.end_time),
                    };
                    combined = Some(match combined {
                        None => one,
                        Some(prev) => combine_drop_matrix_results(&prev, &one)?,
                    });
                }
                if let Some(result) = combined {
                    matrix.push(result);
                }
            }
        }
        Ok(DropMatrixQueryResult { matrix })
    }

    /// Convert elements to a result without folding: resolve each persisted
    /// range once, use the inline descriptor for ad-hoc elements.
    async fn convert_elements_to_result(
        &self,
        elements: Vec<DropMatrixElement>,
    ) -> Result<DropMatrixQueryResult, EngineError> {
        let mut groups: BTreeMap<i32, Vec<DropMatrixElement>> = BTreeMap::new();
        for el in elements {
            groups.entry(el.range_id).or_default().push(el);
        }

        let mut matrix = Vec::new();
        for (range_id, group) in groups {
            let resolved = if range_id == 0 {
                None
            } else {
                Some(self.time_range.time_range_by_id(range_id).await?)
            };
            for el in group {
                let time_range = match &resolved {
                    Some(range) => range.clone(),
                    None => el.time_range.clone().ok_or(EngineError::MissingInlineRange)?,
                };
                matrix.push(OneDropMatrixElement {
                    stage_id: el.stage_id,
                    item_id: el.item_id,
                    quantity: el.quantity,
                    times: el.times,
                    time_range,
                });
            }
        }
        matrix.sort_by_key(|el| (el.stage_id, el.item_id, el.time_range.start_time));
        Ok(DropMatrixQueryResult { matrix })
    }
}

/// Combine two fold partials for the same `(stage, item)`. Mismatched keys
/// are a programmer error.
fn combine_drop_matrix_results(
    a: &OneDropMatrixElement,
    b: &OneDropMatrixElement,
) -> Result<OneDropMatrixElement, EngineError> {
    if a.stage_id != b.stage_id || a.item_id != b.item_id {
        return Err(EngineError::MismatchedKeys {
            stage_a: a.stage_id,
            item_a: a.item_id,
            stage_b: b.stage_id,
            item_b: b.item_id,
        });
    }
    Ok(OneDropMatrixElement {
        stage_id: a.stage_id,
        item_id: a.item_id,
        quantity: a.quantity + b.quantity,
        times: a.times + b.times,
        time_range: TimeRange::ad_hoc(
            a.time_range.server,
            a.time_range.start_time.min(b.time_range.start_time),
            a.time_range.end_time.max(b.time_range.end_time),
        ),
    })
}
