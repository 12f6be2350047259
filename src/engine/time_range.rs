//! Time range index.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::{Server, TimeRange};
use crate::repo::TimeRangeRepo;

use super::EngineError;

/// Answers "which ranges exist for a server" and "which ranges accumulate
/// into one quote per (stage, item)".
pub struct TimeRangeService {
    repo: Arc<dyn TimeRangeRepo>,
}

impl TimeRangeService {
    pub fn new(repo: Arc<dyn TimeRangeRepo>) -> Self {
        Self { repo }
    }

    pub async fn time_ranges_by_server(
        &self,
        server: Server,
    ) -> Result<Vec<TimeRange>, EngineError> {
        Ok(self.repo.time_ranges_by_server(server).await?)
    }

    pub async fn time_range_by_id(&self, range_id: i32) -> Result<TimeRange, EngineError> {
        Ok(self.repo.time_range_by_id(range_id).await?)
    }

    /// `stage → item → [ranges]`: the authoritative max-accumulable grouping.
    pub async fn max_accumulable_time_ranges_by_server(
        &self,
        server: Server,
    ) -> Result<BTreeMap<i32, BTreeMap<i32, Vec<TimeRange>>>, EngineError> {
        Ok(self
            .repo
            .max_accumulable_time_ranges_by_server(server)
            .await?)
    }

    /// The union of all max-accumulable ranges as a flat list, deduplicated
    /// by range id and sorted for determinism. Used by the personal matrix
    /// path, which recomputes elements instead of reading persisted ones.
    pub async fn flat_max_accumulable_ranges(
        &self,
        server: Server,
    ) -> Result<Vec<TimeRange>, EngineError> {
        let grouped = self.max_accumulable_time_ranges_by_server(server).await?;
        let mut by_id: BTreeMap<i32, TimeRange> = BTreeMap::new();
        for chains in grouped.values() {
            for ranges in chains.values() {
                for range in ranges {
                    by_id.insert(range.range_id, range.clone());
                }
            }
        }
        Ok(by_id.into_values().collect())
    }
}
