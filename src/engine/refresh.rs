//! Recompute scheduler: full refresh of persisted drop matrix elements.
//!
//! Fans each of the server's ranges out to a bounded worker pool, collects
//! per-range batches over a buffered channel, and replaces the server's
//! persisted elements in one atomic batch save. A worker error fails the
//! whole refresh; nothing is saved.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{debug, error, info};

use crate::models::{Account, DropMatrixElement, Server};
use crate::repo::DropMatrixElementRepo;

use super::drop_matrix::DropMatrixService;
use super::time_range::TimeRangeService;
use super::EngineError;

/// Default bound on concurrently computed ranges.
pub const DEFAULT_REFRESH_CONCURRENCY: usize = 7;

/// Collector channel capacity.
const COLLECTOR_BUFFER: usize = 15;

/// Outcome of one refresh run.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Number of elements saved.
    pub saved: usize,

    /// Wall-clock time spent per range, keyed by range id.
    pub timings: BTreeMap<i32, Duration>,
}

pub struct RefreshService {
    time_range: Arc<TimeRangeService>,
    drop_matrix: Arc<DropMatrixService>,
    elements: Arc<dyn DropMatrixElementRepo>,
    concurrency: usize,
    cancel_token: Arc<RwLock<bool>>,
}

type WorkerResult = (i32, Duration, Result<Vec<DropMatrixElement>, EngineError>);

impl RefreshService {
    pub fn new(
        time_range: Arc<TimeRangeService>,
        drop_matrix: Arc<DropMatrixService>,
        elements: Arc<dyn DropMatrixElementRepo>,
        concurrency: usize,
    ) -> Self {
        Self {
            time_range,
            drop_matrix,
            elements,
            concurrency: concurrency.max(1),
            cancel_token: Arc::new(RwLock::new(false)),
        }
    }

    /// Request cancellation: no new workers are started, in-flight workers
    /// drain, and the run fails with [`EngineError::Cancelled`].
    pub async fn cancel(&self) {
        *self.cancel_token.write().await = true;
    }

    /// Recompute and persist all matrix elements for `server`.
    pub async fn refresh_server(&self, server: Server) -> Result<RefreshOutcome, EngineError> {
        *self.cancel_token.write().await = false;

        let ranges = self.time_range.time_ranges_by_server(server).await?;
        let total = ranges.len();
        info!(%server, ranges = total, "starting drop matrix refresh");

        let (tx, mut rx) = mpsc::channel::<WorkerResult>(COLLECTOR_BUFFER);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let collector = tokio::spawn(async move {
            let mut elements = Vec::new();
            let mut timings = BTreeMap::new();
            let mut first_err: Option<EngineError> = None;
            while let Some((range_id, took, result)) = rx.recv().await {
                timings.insert(range_id, took);
                match result {
                    Ok(batch) => elements.extend(batch),
                    Err(err) => {
                        error!(range_id, error = %err, "range refresh worker failed");
                        if first_err.is_none() {
                            first_err = Some(err);
                        }
                    }
                }
            }
            (elements, timings, first_err)
        });

        let mut cancelled = false;
        let mut spawned = 0usize;
        for range in ranges {
            if *self.cancel_token.read().await {
                cancelled = true;
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|err| EngineError::Internal(err.to_string()))?;
            let tx = tx.clone();
            let drop_matrix = self.drop_matrix.clone();
            spawned += 1;

            tokio::spawn(async move {
                let started = Instant::now();
                let result = drop_matrix
                    .calc_drop_matrix_for_time_ranges(
                        server,
                        std::slice::from_ref(&range),
                        None,
                        None,
                        Account::Anonymous,
                    )
                    .await;
                let _ = tx.send((range.range_id, started.elapsed(), result)).await;
                drop(permit);
            });
        }
        drop(tx);

        // The channel must drain before anything is saved or surfaced.
        let (elements, timings, first_err) = collector
            .await
            .map_err(|err| EngineError::Internal(err.to_string()))?;

        if let Some(err) = first_err {
            return Err(err);
        }
        if cancelled {
            debug!(%server, spawned, total, "refresh cancelled before completion");
            return Err(EngineError::Cancelled);
        }

        debug!(elements = elements.len(), "saving refreshed matrix elements");
        let saved = self.elements.batch_save_elements(server, elements).await?;
        info!(%server, saved, "drop matrix refresh complete");
        Ok(RefreshOutcome { saved, timings })
    }
}
