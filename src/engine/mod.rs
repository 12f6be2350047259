//! The analytics core: engines that turn the report corpus and reference
//! data into the served artifacts.
//!
//! - **time_range**: range lookups and the max-accumulable grouping
//! - **drop_info**: expected item sets and stage openness
//! - **drop_matrix**: the drop matrix calculator, fold and conversions
//! - **trend**: per-stage bucketed series
//! - **pattern_matrix**: per-stage co-occurrence patterns
//! - **refresh**: the fan-out/fan-in recompute of persisted matrix elements

use thiserror::Error;

use crate::repo::RepoError;
use crate::shim::ShimError;

pub mod drop_info;
pub mod drop_matrix;
pub mod pattern_matrix;
pub mod refresh;
pub mod time_range;
pub mod trend;

/// Errors produced by the engines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("shim error: {0}")]
    Shim(#[from] ShimError),

    /// Combining elements for different `(stage, item)` keys is a programmer
    /// error in the max-accumulable fold.
    #[error("cannot combine elements for (stage {stage_a}, item {item_a}) and (stage {stage_b}, item {item_b})")]
    MismatchedKeys {
        stage_a: i32,
        item_a: i32,
        stage_b: i32,
        item_b: i32,
    },

    #[error("element for ad-hoc range is missing its inline time range")]
    MissingInlineRange,

    #[error("refresh cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}
