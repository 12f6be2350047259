//! Drop info index.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheContext, CacheSet};
use crate::models::{DropInfo, Server, TimeRange};
use crate::repo::DropInfoRepo;

use super::EngineError;

/// TTL of the current drop-info snapshot.
const CURRENT_DROP_INFOS_TTL: Duration = Duration::from_secs(60 * 60);

/// Answers "which items drop at which stage during which range" and "is the
/// stage currently open".
pub struct DropInfoService {
    repo: Arc<dyn DropInfoRepo>,
    current_cache: CacheSet<Vec<DropInfo>>,
}

impl DropInfoService {
    pub fn new(repo: Arc<dyn DropInfoRepo>, caches: &CacheContext) -> Self {
        Self {
            repo,
            current_cache: caches.local_set("current_drop_infos"),
        }
    }

    pub async fn drop_infos_with_filters(
        &self,
        server: Server,
        ranges: &[TimeRange],
        stage_filter: Option<&[i32]>,
        item_filter: Option<&[i32]>,
    ) -> Result<Vec<DropInfo>, EngineError> {
        Ok(self
            .repo
            .drop_infos_with_filters(server, ranges, stage_filter, item_filter)
            .await?)
    }

    pub async fn item_drop_set(
        &self,
        server: Server,
        stage_id: i32,
        range_id: i32,
    ) -> Result<Vec<i32>, EngineError> {
        Ok(self.repo.item_drop_set(server, stage_id, range_id).await?)
    }

    /// The drop infos active right now, cached for an hour.
    pub async fn current_drop_infos(&self, server: Server) -> Result<Vec<DropInfo>, EngineError> {
        let repo = self.repo.clone();
        let (_, infos) = self
            .current_cache
            .mutex_get_set(
                server.as_str(),
                || async move { repo.current_drop_infos(server).await.map_err(EngineError::from) },
                CURRENT_DROP_INFOS_TTL,
            )
            .await?;
        Ok(infos)
    }

    /// Stages whose zone is currently open, derived from the current drop
    /// info snapshot. Drives the `show_closed_zones = false` view.
    pub async fn opening_stage_ids(&self, server: Server) -> Result<BTreeSet<i32>, EngineError> {
        let current = self.current_drop_infos(server).await?;
        Ok(current.into_iter().map(|info| info.stage_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimeRange;
    use crate::repo::memory::MemoryDropInfoRepo;
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test]
    async fn test_opening_stage_ids_from_current_ranges() {
        let now = Utc::now();
        let ranges = vec![
            TimeRange::new(1, Server::CN, now - ChronoDuration::hours(2), now + ChronoDuration::hours(2)),
            TimeRange::new(2, Server::CN, now - ChronoDuration::days(30), now - ChronoDuration::days(20)),
        ];
        let drop_infos = vec![
            DropInfo::new(1, Server::CN, 1, Some(7), 1),
            DropInfo::new(2, Server::CN, 2, Some(8), 2),
        ];
        let service = DropInfoService::new(
            Arc::new(MemoryDropInfoRepo::new(drop_infos, ranges)),
            &CacheContext::new(),
        );

        let open = service.opening_stage_ids(Server::CN).await.unwrap();
        assert!(open.contains(&1));
        assert!(!open.contains(&2));
    }

    #[tokio::test]
    async fn test_current_drop_infos_cached() {
        let now = Utc::now();
        let ranges = vec![TimeRange::new(
            1,
            Server::CN,
            now - ChronoDuration::hours(1),
            now + ChronoDuration::hours(1),
        )];
        let drop_infos = vec![DropInfo::new(1, Server::CN, 1, Some(7), 1)];
        let service = DropInfoService::new(
            Arc::new(MemoryDropInfoRepo::new(drop_infos, ranges)),
            &CacheContext::new(),
        );

        let first = service.current_drop_infos(Server::CN).await.unwrap();
        let second = service.current_drop_infos(Server::CN).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
