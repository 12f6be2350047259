//! Trend engine: per-stage time-bucketed quantity and attempt series.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::debug;

use crate::cache::{CacheContext, CacheSet};
use crate::models::{OneItemTrend, Server, StageTrend, TrendQueryResult};
use crate::repo::DropReportQuery;
use crate::shim::{Shim, ShimTrendQueryResult};

use super::drop_info::DropInfoService;
use super::time_range::TimeRangeService;
use super::EngineError;

/// Width of one trend bucket.
const TREND_BUCKET: Duration = Duration::from_secs(24 * 60 * 60);

/// The series covers at most this many buckets ending at `now`.
const MAX_TREND_BUCKETS: usize = 60;

/// TTL of cached trend results.
const TREND_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct TrendService {
    time_range: Arc<TimeRangeService>,
    drop_info: Arc<DropInfoService>,
    reports: Arc<dyn DropReportQuery>,
    shim: Arc<Shim>,
    shim_cache: CacheSet<ShimTrendQueryResult>,
}

impl TrendService {
    pub fn new(
        time_range: Arc<TimeRangeService>,
        drop_info: Arc<DropInfoService>,
        reports: Arc<dyn DropReportQuery>,
        shim: Arc<Shim>,
        caches: &CacheContext,
    ) -> Self {
        Self {
            time_range,
            drop_info,
            reports,
            shim,
            shim_cache: caches.mirrored_set("shim_trend"),
        }
    }

    /// The per-stage trend for a server, shimmed and cached per server.
    pub async fn get_shim_trend(&self, server: Server) -> Result<ShimTrendQueryResult, EngineError> {
        let (computed, result) = self
            .shim_cache
            .mutex_get_set(
                server.as_str(),
                || async {
                    let result = self.calc_trend(server).await?;
                    Ok::<_, EngineError>(self.shim.apply_trend(&result).await?)
                },
                TREND_RESULT_TTL,
            )
            .await?;
        if computed {
            debug!(%server, "recomputed trend");
        }
        Ok(result)
    }

    /// When the cached trend was last recomputed, if it is cached.
    pub async fn result_last_modified(
        &self,
        server: Server,
    ) -> Option<chrono::DateTime<chrono::Utc>> {
        self.shim_cache.last_modified(server.as_str()).await
    }

    /// One [`StageTrend`] per stage currently open on the server, anchored
    /// at the later of the stage's active range start and the window start.
    pub(crate) async fn calc_trend(&self, server: Server) -> Result<TrendQueryResult, EngineError> {
        let now = Utc::now();
        let window_start = now - ChronoDuration::days(MAX_TREND_BUCKETS as i64);

        let current = self.drop_info.current_drop_infos(server).await?;

        let mut stage_ranges: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
        let mut stage_items: BTreeMap<i32, BTreeSet<i32>> = BTreeMap::new();
        for info in &current {
            stage_ranges
                .entry(info.stage_id)
                .or_default()
                .insert(info.range_id);
            if let Some(item_id) = info.item_id {
                stage_items.entry(info.stage_id).or_default().insert(item_id);
            }
        }

        let mut trend = BTreeMap::new();
        for (stage_id, range_ids) in stage_ranges {
            // A stage can appear in several active ranges; anchor at the one
            // that started last.
            let mut active_start: Option<DateTime<Utc>> = None;
            for range_id in range_ids {
                let range = self.time_range.time_range_by_id(range_id).await?;
                if range.contains(now) {
                    active_start = Some(match active_start {
                        None => range.start_time,
                        Some(start) => start.max(range.start_time),
                    });
                }
            }
            let Some(range_start) = active_start else {
                continue;
            };

            let start = range_start.max(window_start);
            let span_millis = (now - start).num_milliseconds().max(0);
            let bucket_millis = TREND_BUCKET.as_millis() as i64;
            let buckets = ((span_millis + bucket_millis - 1) / bucket_millis).max(1) as usize;
            let buckets = buckets.min(MAX_TREND_BUCKETS);

            let quantity_series = self
                .reports
                .quantity_series(server, stage_id, start, TREND_BUCKET, buckets)
                .await?;
            let times_series = self
                .reports
                .times_series(server, stage_id, start, TREND_BUCKET, buckets)
                .await?;

            let mut results = BTreeMap::new();
            for item_id in stage_items.get(&stage_id).into_iter().flatten() {
                let quantity = quantity_series
                    .get(item_id)
                    .cloned()
                    .unwrap_or_else(|| vec![0; buckets]);
                results.insert(
                    *item_id,
                    OneItemTrend {
                        quantity,
                        times: times_series.clone(),
                    },
                );
            }

            trend.insert(
                stage_id,
                StageTrend {
                    start_time: start,
                    results,
                },
            );
        }
        Ok(TrendQueryResult { trend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Drop, DropInfo, DropReport, Item, Stage, TimeRange};
    use crate::repo::memory::{
        MemoryDropInfoRepo, MemoryItemRepo, MemoryReportStore, MemoryStageRepo, MemoryTimeRangeRepo,
    };

    fn service(
        ranges: Vec<TimeRange>,
        drop_infos: Vec<DropInfo>,
        reports: Vec<DropReport>,
    ) -> TrendService {
        let caches = CacheContext::new();
        TrendService::new(
            Arc::new(TimeRangeService::new(Arc::new(MemoryTimeRangeRepo::new(
                ranges.clone(),
                drop_infos.clone(),
            )))),
            Arc::new(DropInfoService::new(
                Arc::new(MemoryDropInfoRepo::new(drop_infos, ranges)),
                &caches,
            )),
            Arc::new(MemoryReportStore::new(reports)),
            Arc::new(Shim::new(
                Arc::new(MemoryStageRepo::new(vec![Stage::new(1, "main_01-07", 1)], vec![])),
                Arc::new(MemoryItemRepo::new(vec![Item::new(7, "30012", "Orirock Cube")])),
            )),
            &caches,
        )
    }

    #[tokio::test]
    async fn test_trend_buckets_and_zero_fill() {
        let now = Utc::now();
        let start = now - ChronoDuration::days(3);
        let ranges = vec![TimeRange::new(
            1,
            Server::CN,
            start,
            now + ChronoDuration::days(10),
        )];
        let drop_infos = vec![
            DropInfo::new(1, Server::CN, 1, Some(7), 1),
            DropInfo::new(2, Server::CN, 1, Some(8), 1),
        ];
        let reports = vec![
            DropReport::new(
                1,
                Server::CN,
                1,
                vec![Drop {
                    item_id: 7,
                    quantity: 4,
                }],
                start + ChronoDuration::hours(1),
            ),
            DropReport::new(
                2,
                Server::CN,
                1,
                vec![Drop {
                    item_id: 7,
                    quantity: 2,
                }],
                start + ChronoDuration::days(1) + ChronoDuration::hours(1),
            ),
        ];
        let service = service(ranges, drop_infos, reports);

        let result = service.calc_trend(Server::CN).await.unwrap();
        let stage = result.trend.get(&1).unwrap();
        assert_eq!(stage.start_time, start);

        let observed = stage.results.get(&7).unwrap();
        assert_eq!(observed.quantity.len(), observed.times.len());
        assert_eq!(observed.quantity[0], 4);
        assert_eq!(observed.quantity[1], 2);
        assert_eq!(observed.times[0], 1);

        // Item 8 never dropped: zero series of the same length.
        let unseen = stage.results.get(&8).unwrap();
        assert!(unseen.quantity.iter().all(|&q| q == 0));
        assert_eq!(unseen.quantity.len(), observed.quantity.len());
    }

    #[tokio::test]
    async fn test_trend_window_clamps_old_ranges() {
        let now = Utc::now();
        let ranges = vec![TimeRange::new(
            1,
            Server::CN,
            now - ChronoDuration::days(400),
            now + ChronoDuration::days(10),
        )];
        let drop_infos = vec![DropInfo::new(1, Server::CN, 1, Some(7), 1)];
        let service = service(ranges, drop_infos, vec![]);

        let result = service.calc_trend(Server::CN).await.unwrap();
        let stage = result.trend.get(&1).unwrap();
        assert!(stage.start_time >= now - ChronoDuration::days(61));
        let trend = stage.results.get(&7).unwrap();
        assert_eq!(trend.quantity.len(), MAX_TREND_BUCKETS);
    }

    #[tokio::test]
    async fn test_trend_skips_closed_stages() {
        let now = Utc::now();
        let ranges = vec![TimeRange::new(
            1,
            Server::CN,
            now - ChronoDuration::days(30),
            now - ChronoDuration::days(10),
        )];
        let drop_infos = vec![DropInfo::new(1, Server::CN, 1, Some(7), 1)];
        let service = service(ranges, drop_infos, vec![]);

        let result = service.calc_trend(Server::CN).await.unwrap();
        assert!(result.trend.is_empty());
    }

    #[tokio::test]
    async fn test_shim_trend_cached() {
        let now = Utc::now();
        let ranges = vec![TimeRange::new(
            1,
            Server::CN,
            now - ChronoDuration::days(1),
            now + ChronoDuration::days(1),
        )];
        let drop_infos = vec![DropInfo::new(1, Server::CN, 1, Some(7), 1)];
        let service = service(ranges, drop_infos, vec![]);

        let first = service.get_shim_trend(Server::CN).await.unwrap();
        let second = service.get_shim_trend(Server::CN).await.unwrap();
        assert_eq!(first, second);
        assert!(first.trend.contains_key("main_01-07"));
    }
}
