//! Capability seams over the external stores.
//!
//! The engines only ever talk to these traits. The relational store, the
//! shared cache and the archive live behind them; `memory` provides
//! in-process implementations backed by the JSONL data lake.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Account, DropInfo, DropMatrixElement, DropPattern, DropReport, Item, Server, Stage, TimeRange,
    Zone,
};

pub mod memory;

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("upstream error: {0}")]
    Upstream(String),
}

/// Summed quantity for one `(stage, item)` over one range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalQuantityResult {
    pub stage_id: i32,
    pub item_id: i32,
    pub total_quantity: i64,
}

/// Report count for one stage over one range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalTimesResult {
    pub stage_id: i32,
    pub total_times: i64,
}

/// One grouped pattern row: how many reports at `stage_id` recorded exactly
/// `pattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternGroupRow {
    pub stage_id: i32,
    pub pattern: DropPattern,
    pub count: i64,
}

/// Stage and zone reference data.
#[async_trait]
pub trait StageRepo: Send + Sync {
    async fn list(&self) -> Result<Vec<Stage>, RepoError>;
    async fn get_by_id(&self, stage_id: i32) -> Result<Stage, RepoError>;
    async fn get_by_ark_id(&self, ark_stage_id: &str) -> Result<Stage, RepoError>;
    async fn list_zones(&self) -> Result<Vec<Zone>, RepoError>;
    async fn get_zone_by_ark_id(&self, ark_zone_id: &str) -> Result<Zone, RepoError>;
}

/// Item reference data.
#[async_trait]
pub trait ItemRepo: Send + Sync {
    async fn list(&self) -> Result<Vec<Item>, RepoError>;
    async fn get_by_id(&self, item_id: i32) -> Result<Item, RepoError>;
    async fn get_by_ark_id(&self, ark_item_id: &str) -> Result<Item, RepoError>;
}

/// Time range reference data, including the authoritative max-accumulable
/// grouping.
#[async_trait]
pub trait TimeRangeRepo: Send + Sync {
    async fn time_ranges_by_server(&self, server: Server) -> Result<Vec<TimeRange>, RepoError>;

    async fn time_range_by_id(&self, range_id: i32) -> Result<TimeRange, RepoError>;

    /// For each `(stage, item)`, the chain of ranges whose quantities and
    /// times accumulate into one headline figure.
    async fn max_accumulable_time_ranges_by_server(
        &self,
        server: Server,
    ) -> Result<BTreeMap<i32, BTreeMap<i32, Vec<TimeRange>>>, RepoError>;
}

/// Drop info reference data.
#[async_trait]
pub trait DropInfoRepo: Send + Sync {
    /// Drop infos active in any of `ranges`, optionally restricted to the
    /// given stages/items. Persisted ranges match by id; ad-hoc ranges match
    /// by overlap.
    async fn drop_infos_with_filters(
        &self,
        server: Server,
        ranges: &[TimeRange],
        stage_filter: Option<&[i32]>,
        item_filter: Option<&[i32]>,
    ) -> Result<Vec<DropInfo>, RepoError>;

    /// Expected item ids for one `(stage, range)`.
    async fn item_drop_set(
        &self,
        server: Server,
        stage_id: i32,
        range_id: i32,
    ) -> Result<Vec<i32>, RepoError>;

    /// Drop infos whose range covers the present instant.
    async fn current_drop_infos(&self, server: Server) -> Result<Vec<DropInfo>, RepoError>;
}

/// Aggregate queries over the drop report corpus.
#[async_trait]
pub trait DropReportQuery: Send + Sync {
    /// For every `(stage, item)` in `stage_items`, the summed quantity
    /// across reports whose timestamp lies in `range`.
    async fn total_quantity(
        &self,
        server: Server,
        range: &TimeRange,
        stage_items: &BTreeMap<i32, Vec<i32>>,
        account: Account,
    ) -> Result<Vec<TotalQuantityResult>, RepoError>;

    /// For every stage in `stage_ids`, the number of reports in `range`.
    async fn total_times(
        &self,
        server: Server,
        range: &TimeRange,
        stage_ids: &[i32],
        account: Account,
    ) -> Result<Vec<TotalTimesResult>, RepoError>;

    /// Per-item, per-bucket summed quantities for one stage over `buckets`
    /// consecutive buckets of `bucket` width starting at `start`.
    async fn quantity_series(
        &self,
        server: Server,
        stage_id: i32,
        start: DateTime<Utc>,
        bucket: Duration,
        buckets: usize,
    ) -> Result<BTreeMap<i32, Vec<i64>>, RepoError>;

    /// Per-bucket report counts for one stage.
    async fn times_series(
        &self,
        server: Server,
        stage_id: i32,
        start: DateTime<Utc>,
        bucket: Duration,
        buckets: usize,
    ) -> Result<Vec<i64>, RepoError>;

    /// Reports grouped by canonical drop pattern for the given stages and
    /// range.
    async fn pattern_groups(
        &self,
        server: Server,
        range: &TimeRange,
        stage_ids: &[i32],
        account: Account,
    ) -> Result<Vec<PatternGroupRow>, RepoError>;
}

/// The materialised drop matrix element store.
#[async_trait]
pub trait DropMatrixElementRepo: Send + Sync {
    async fn elements_by_server(&self, server: Server) -> Result<Vec<DropMatrixElement>, RepoError>;

    /// Replace all elements for `server` with `elements` in one atomic step.
    async fn batch_save_elements(
        &self,
        server: Server,
        elements: Vec<DropMatrixElement>,
    ) -> Result<usize, RepoError>;
}

/// Token → account resolution for personal queries. Authentication itself is
/// external; the core only needs the mapping.
#[async_trait]
pub trait AccountRepo: Send + Sync {
    async fn get_account_by_token(&self, token: &str) -> Result<Option<i64>, RepoError>;
}

/// Convenience alias used by report corpus implementations.
pub type ReportCorpus = Vec<DropReport>;
