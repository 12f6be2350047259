//! In-memory repository implementations.
//!
//! Reference data is loaded once (directly or from the JSONL data lake) and
//! held immutable for the process lifetime. Aggregate report queries scan
//! the in-memory corpus; the matrix element store is backed by the data
//! lake's per-server files.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{
    Account, DropInfo, DropMatrixElement, DropPattern, DropReport, Item, Server, Stage, TimeRange,
    Zone,
};
use crate::storage::{JsonlReader, JsonlWriter, ReferenceEntity, StorageConfig};

use super::{
    AccountRepo, DropInfoRepo, DropMatrixElementRepo, DropReportQuery, ItemRepo, PatternGroupRow,
    RepoError, ReportCorpus, StageRepo, TimeRangeRepo, TotalQuantityResult, TotalTimesResult,
};

fn account_matches(report: &DropReport, account: Account) -> bool {
    match account {
        Account::Anonymous => true,
        Account::Known(id) => report.account_id == Some(id),
    }
}

// ── Stages & zones ──────────────────────────────────────────────

pub struct MemoryStageRepo {
    stages: Vec<Stage>,
    zones: Vec<Zone>,
    by_id: HashMap<i32, usize>,
    by_ark_id: HashMap<String, usize>,
    zones_by_ark_id: HashMap<String, usize>,
}

impl MemoryStageRepo {
    pub fn new(stages: Vec<Stage>, zones: Vec<Zone>) -> Self {
        let by_id = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.stage_id, i))
            .collect();
        let by_ark_id = stages
            .iter()
            .enumerate()
            .map(|(i, s)| (s.ark_stage_id.clone(), i))
            .collect();
        let zones_by_ark_id = zones
            .iter()
            .enumerate()
            .map(|(i, z)| (z.ark_zone_id.clone(), i))
            .collect();
        Self {
            stages,
            zones,
            by_id,
            by_ark_id,
            zones_by_ark_id,
        }
    }

    pub fn from_storage(config: &StorageConfig) -> Result<Self, RepoError> {
        let stages: Vec<Stage> =
            JsonlReader::new(config.reference_path(ReferenceEntity::Stage)).read_all()?;
        let zones: Vec<Zone> =
            JsonlReader::new(config.reference_path(ReferenceEntity::Zone)).read_all()?;
        debug!(stages = stages.len(), zones = zones.len(), "loaded stages");
        Ok(Self::new(stages, zones))
    }
}

#[async_trait]
impl StageRepo for MemoryStageRepo {
    async fn list(&self) -> Result<Vec<Stage>, RepoError> {
        Ok(self.stages.clone())
    }

    async fn get_by_id(&self, stage_id: i32) -> Result<Stage, RepoError> {
        self.by_id
            .get(&stage_id)
            .map(|&i| self.stages[i].clone())
            .ok_or_else(|| RepoError::NotFound(format!("stage {}", stage_id)))
    }

    async fn get_by_ark_id(&self, ark_stage_id: &str) -> Result<Stage, RepoError> {
        self.by_ark_id
            .get(ark_stage_id)
            .map(|&i| self.stages[i].clone())
            .ok_or_else(|| RepoError::NotFound(format!("stage {}", ark_stage_id)))
    }

    async fn list_zones(&self) -> Result<Vec<Zone>, RepoError> {
        Ok(self.zones.clone())
    }

    async fn get_zone_by_ark_id(&self, ark_zone_id: &str) -> Result<Zone, RepoError> {
        self.zones_by_ark_id
            .get(ark_zone_id)
            .map(|&i| self.zones[i].clone())
            .ok_or_else(|| RepoError::NotFound(format!("zone {}", ark_zone_id)))
    }
}

// ── Items ───────────────────────────────────────────────────────

pub struct MemoryItemRepo {
    items: Vec<Item>,
    by_id: HashMap<i32, usize>,
    by_ark_id: HashMap<String, usize>,
}

impl MemoryItemRepo {
    pub fn new(items: Vec<Item>) -> Self {
        let by_id = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.item_id, i))
            .collect();
        let by_ark_id = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.ark_item_id.clone(), i))
            .collect();
        Self {
            items,
            by_id,
            by_ark_id,
        }
    }

    pub fn from_storage(config: &StorageConfig) -> Result<Self, RepoError> {
        let items: Vec<Item> =
            JsonlReader::new(config.reference_path(ReferenceEntity::Item)).read_all()?;
        debug!(items = items.len(), "loaded items");
        Ok(Self::new(items))
    }
}

#[async_trait]
impl ItemRepo for MemoryItemRepo {
    async fn list(&self) -> Result<Vec<Item>, RepoError> {
        Ok(self.items.clone())
    }

    async fn get_by_id(&self, item_id: i32) -> Result<Item, RepoError> {
        self.by_id
            .get(&item_id)
            .map(|&i| self.items[i].clone())
            .ok_or_else(|| RepoError::NotFound(format!("item {}", item_id)))
    }

    async fn get_by_ark_id(&self, ark_item_id: &str) -> Result<Item, RepoError> {
        self.by_ark_id
            .get(ark_item_id)
            .map(|&i| self.items[i].clone())
            .ok_or_else(|| RepoError::NotFound(format!("item {}", ark_item_id)))
    }
}

// ── Time ranges ─────────────────────────────────────────────────

pub struct MemoryTimeRangeRepo {
    ranges: Vec<TimeRange>,
    by_id: HashMap<i32, usize>,
    drop_infos: Vec<DropInfo>,
}

impl MemoryTimeRangeRepo {
    pub fn new(ranges: Vec<TimeRange>, drop_infos: Vec<DropInfo>) -> Self {
        let by_id = ranges
            .iter()
            .enumerate()
            .map(|(i, r)| (r.range_id, i))
            .collect();
        Self {
            ranges,
            by_id,
            drop_infos,
        }
    }

    pub fn from_storage(config: &StorageConfig) -> Result<Self, RepoError> {
        let ranges: Vec<TimeRange> =
            JsonlReader::new(config.reference_path(ReferenceEntity::TimeRange)).read_all()?;
        let drop_infos: Vec<DropInfo> =
            JsonlReader::new(config.reference_path(ReferenceEntity::DropInfo)).read_all()?;
        debug!(ranges = ranges.len(), "loaded time ranges");
        Ok(Self::new(ranges, drop_infos))
    }

    fn range_by_id(&self, range_id: i32) -> Option<&TimeRange> {
        self.by_id.get(&range_id).map(|&i| &self.ranges[i])
    }
}

#[async_trait]
impl TimeRangeRepo for MemoryTimeRangeRepo {
    async fn time_ranges_by_server(&self, server: Server) -> Result<Vec<TimeRange>, RepoError> {
        let mut ranges: Vec<TimeRange> = self
            .ranges
            .iter()
            .filter(|r| r.server == server)
            .cloned()
            .collect();
        ranges.sort_by_key(|r| r.range_id);
        Ok(ranges)
    }

    async fn time_range_by_id(&self, range_id: i32) -> Result<TimeRange, RepoError> {
        self.range_by_id(range_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(format!("time range {}", range_id)))
    }

    async fn max_accumulable_time_ranges_by_server(
        &self,
        server: Server,
    ) -> Result<BTreeMap<i32, BTreeMap<i32, Vec<TimeRange>>>, RepoError> {
        // Group each (stage, item)'s ranges, newest first. A chain extends
        // backwards from the newest range while the drop info bounds stay
        // unchanged; a bounds change is a regime change and truncates it.
        let mut per_stage_item: BTreeMap<(i32, i32), Vec<&DropInfo>> = BTreeMap::new();
        for info in &self.drop_infos {
            if info.server != server {
                continue;
            }
            let Some(item_id) = info.item_id else {
                continue;
            };
            per_stage_item
                .entry((info.stage_id, item_id))
                .or_default()
                .push(info);
        }

        let mut result: BTreeMap<i32, BTreeMap<i32, Vec<TimeRange>>> = BTreeMap::new();
        for ((stage_id, item_id), infos) in per_stage_item {
            let mut dated: Vec<(&DropInfo, TimeRange)> = infos
                .into_iter()
                .filter_map(|info| {
                    self.range_by_id(info.range_id)
                        .map(|range| (info, range.clone()))
                })
                .collect();
            if dated.is_empty() {
                continue;
            }
            dated.sort_by(|a, b| b.1.start_time.cmp(&a.1.start_time));

            let newest_bounds = dated[0].0.bounds;
            let mut chain: Vec<TimeRange> = Vec::new();
            for (info, range) in dated {
                if info.bounds != newest_bounds {
                    break;
                }
                chain.push(range);
            }
            chain.sort_by_key(|r| r.start_time);

            result
                .entry(stage_id)
                .or_default()
                .insert(item_id, chain);
        }
        Ok(result)
    }
}

// ── Drop infos ──────────────────────────────────────────────────

pub struct MemoryDropInfoRepo {
    drop_infos: Vec<DropInfo>,
    ranges_by_id: HashMap<i32, TimeRange>,
}

impl MemoryDropInfoRepo {
    pub fn new(drop_infos: Vec<DropInfo>, ranges: Vec<TimeRange>) -> Self {
        let ranges_by_id = ranges.into_iter().map(|r| (r.range_id, r)).collect();
        Self {
            drop_infos,
            ranges_by_id,
        }
    }

    pub fn from_storage(config: &StorageConfig) -> Result<Self, RepoError> {
        let drop_infos: Vec<DropInfo> =
            JsonlReader::new(config.reference_path(ReferenceEntity::DropInfo)).read_all()?;
        let ranges: Vec<TimeRange> =
            JsonlReader::new(config.reference_path(ReferenceEntity::TimeRange)).read_all()?;
        debug!(drop_infos = drop_infos.len(), "loaded drop infos");
        Ok(Self::new(drop_infos, ranges))
    }

    fn info_active_in(&self, info: &DropInfo, range: &TimeRange) -> bool {
        if range.is_ad_hoc() {
            self.ranges_by_id
                .get(&info.range_id)
                .map(|own| own.overlaps(range))
                .unwrap_or(false)
        } else {
            info.range_id == range.range_id
        }
    }
}

#[async_trait]
impl DropInfoRepo for MemoryDropInfoRepo {
    async fn drop_infos_with_filters(
        &self,
        server: Server,
        ranges: &[TimeRange],
        stage_filter: Option<&[i32]>,
        item_filter: Option<&[i32]>,
    ) -> Result<Vec<DropInfo>, RepoError> {
        let mut matched: Vec<DropInfo> = self
            .drop_infos
            .iter()
            .filter(|info| info.server == server)
            .filter(|info| ranges.iter().any(|range| self.info_active_in(info, range)))
            .filter(|info| match stage_filter {
                Some(stages) if !stages.is_empty() => stages.contains(&info.stage_id),
                _ => true,
            })
            .filter(|info| match item_filter {
                Some(items) if !items.is_empty() => {
                    info.item_id.map(|id| items.contains(&id)).unwrap_or(false)
                }
                _ => true,
            })
            .cloned()
            .collect();
        matched.sort_by_key(|info| info.drop_id);
        matched.dedup_by_key(|info| info.drop_id);
        Ok(matched)
    }

    async fn item_drop_set(
        &self,
        server: Server,
        stage_id: i32,
        range_id: i32,
    ) -> Result<Vec<i32>, RepoError> {
        let set: BTreeSet<i32> = self
            .drop_infos
            .iter()
            .filter(|info| {
                info.server == server && info.stage_id == stage_id && info.range_id == range_id
            })
            .filter_map(|info| info.item_id)
            .collect();
        Ok(set.into_iter().collect())
    }

    async fn current_drop_infos(&self, server: Server) -> Result<Vec<DropInfo>, RepoError> {
        let now = Utc::now();
        let mut current: Vec<DropInfo> = self
            .drop_infos
            .iter()
            .filter(|info| info.server == server)
            .filter(|info| {
                self.ranges_by_id
                    .get(&info.range_id)
                    .map(|range| range.contains(now))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        current.sort_by_key(|info| info.drop_id);
        Ok(current)
    }
}

// ── Drop reports ────────────────────────────────────────────────

pub struct MemoryReportStore {
    reports: ReportCorpus,
}

impl MemoryReportStore {
    pub fn new(reports: ReportCorpus) -> Self {
        Self { reports }
    }

    pub fn from_storage(config: &StorageConfig) -> Result<Self, RepoError> {
        let mut reports = Vec::new();
        for server in Server::ALL {
            let batch: Vec<DropReport> =
                JsonlReader::new(config.reports_path(server)).read_all()?;
            reports.extend(batch);
        }
        debug!(reports = reports.len(), "loaded report corpus");
        Ok(Self::new(reports))
    }

    fn scoped<'a>(
        &'a self,
        server: Server,
        range: &'a TimeRange,
        account: Account,
    ) -> impl Iterator<Item = &'a DropReport> {
        self.reports.iter().filter(move |report| {
            report.server == server
                && report.reliable
                && range.contains(report.created_at)
                && account_matches(report, account)
        })
    }
}

#[async_trait]
impl DropReportQuery for MemoryReportStore {
    async fn total_quantity(
        &self,
        server: Server,
        range: &TimeRange,
        stage_items: &BTreeMap<i32, Vec<i32>>,
        account: Account,
    ) -> Result<Vec<TotalQuantityResult>, RepoError> {
        let mut totals: BTreeMap<(i32, i32), i64> = BTreeMap::new();
        for report in self.scoped(server, range, account) {
            let Some(expected) = stage_items.get(&report.stage_id) else {
                continue;
            };
            for drop in &report.drops {
                if expected.contains(&drop.item_id) {
                    *totals.entry((report.stage_id, drop.item_id)).or_default() += drop.quantity;
                }
            }
        }
        Ok(totals
            .into_iter()
            .map(|((stage_id, item_id), total_quantity)| TotalQuantityResult {
                stage_id,
                item_id,
                total_quantity,
            })
            .collect())
    }

    async fn total_times(
        &self,
        server: Server,
        range: &TimeRange,
        stage_ids: &[i32],
        account: Account,
    ) -> Result<Vec<TotalTimesResult>, RepoError> {
        let mut totals: BTreeMap<i32, i64> = BTreeMap::new();
        for report in self.scoped(server, range, account) {
            if stage_ids.contains(&report.stage_id) {
                *totals.entry(report.stage_id).or_default() += report.times;
            }
        }
        Ok(totals
            .into_iter()
            .map(|(stage_id, total_times)| TotalTimesResult {
                stage_id,
                total_times,
            })
            .collect())
    }

    async fn quantity_series(
        &self,
        server: Server,
        stage_id: i32,
        start: DateTime<Utc>,
        bucket: Duration,
        buckets: usize,
    ) -> Result<BTreeMap<i32, Vec<i64>>, RepoError> {
        let bucket_millis = bucket.as_millis() as i64;
        let mut series: BTreeMap<i32, Vec<i64>> = BTreeMap::new();
        for report in &self.reports {
            if report.server != server || report.stage_id != stage_id || !report.reliable {
                continue;
            }
            let offset = report.created_at.timestamp_millis() - start.timestamp_millis();
            if offset < 0 {
                continue;
            }
            let index = (offset / bucket_millis) as usize;
            if index >= buckets {
                continue;
            }
            for drop in &report.drops {
                let slots = series
                    .entry(drop.item_id)
                    .or_insert_with(|| vec![0; buckets]);
                slots[index] += drop.quantity;
            }
        }
        Ok(series)
    }

    async fn times_series(
        &self,
        server: Server,
        stage_id: i32,
        start: DateTime<Utc>,
        bucket: Duration,
        buckets: usize,
    ) -> Result<Vec<i64>, RepoError> {
        let bucket_millis = bucket.as_millis() as i64;
        let mut series = vec![0i64; buckets];
        for report in &self.reports {
            if report.server != server || report.stage_id != stage_id || !report.reliable {
                continue;
            }
            let offset = report.created_at.timestamp_millis() - start.timestamp_millis();
            if offset < 0 {
                continue;
            }
            let index = (offset / bucket_millis) as usize;
            if index >= buckets {
                continue;
            }
            series[index] += report.times;
        }
        Ok(series)
    }

    async fn pattern_groups(
        &self,
        server: Server,
        range: &TimeRange,
        stage_ids: &[i32],
        account: Account,
    ) -> Result<Vec<PatternGroupRow>, RepoError> {
        let mut groups: BTreeMap<(i32, DropPattern), i64> = BTreeMap::new();
        for report in self.scoped(server, range, account) {
            if !stage_ids.contains(&report.stage_id) {
                continue;
            }
            let raw: Vec<(i32, i64)> = report
                .drops
                .iter()
                .map(|drop| (drop.item_id, drop.quantity))
                .collect();
            let pattern = DropPattern::from_drops(&raw);
            *groups.entry((report.stage_id, pattern)).or_default() += report.times;
        }
        Ok(groups
            .into_iter()
            .map(|((stage_id, pattern), count)| PatternGroupRow {
                stage_id,
                pattern,
                count,
            })
            .collect())
    }
}

// ── Matrix elements ─────────────────────────────────────────────

/// Matrix element store backed by the data lake's per-server files.
pub struct JsonlMatrixElementRepo {
    config: StorageConfig,
}

impl JsonlMatrixElementRepo {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DropMatrixElementRepo for JsonlMatrixElementRepo {
    async fn elements_by_server(
        &self,
        server: Server,
    ) -> Result<Vec<DropMatrixElement>, RepoError> {
        let reader: JsonlReader<DropMatrixElement> =
            JsonlReader::new(self.config.matrix_path(server));
        Ok(reader.read_all()?)
    }

    async fn batch_save_elements(
        &self,
        server: Server,
        elements: Vec<DropMatrixElement>,
    ) -> Result<usize, RepoError> {
        let writer: JsonlWriter<DropMatrixElement> =
            JsonlWriter::new(self.config.matrix_path(server));
        Ok(writer.replace_all(&elements)?)
    }
}

// ── Accounts ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryAccountRepo {
    tokens: HashMap<String, i64>,
}

impl MemoryAccountRepo {
    pub fn new(tokens: HashMap<String, i64>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl AccountRepo for MemoryAccountRepo {
    async fn get_account_by_token(&self, token: &str) -> Result<Option<i64>, RepoError> {
        Ok(self.tokens.get(token).copied())
    }
}
