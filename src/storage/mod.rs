//! Filesystem data lake operations.
//!
//! Handles reading and writing the local data lake:
//! - Reference data (items, stages, zones, time ranges, drop infos)
//! - Per-server report corpus
//! - Per-server materialised drop matrix elements

use std::path::PathBuf;

use thiserror::Error;

use crate::models::Server;

mod jsonl;

pub use jsonl::{JsonlReader, JsonlWriter};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

/// Reference entity files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceEntity {
    Item,
    Stage,
    Zone,
    TimeRange,
    DropInfo,
}

impl ReferenceEntity {
    pub fn filename(&self) -> &'static str {
        match self {
            ReferenceEntity::Item => "items.jsonl",
            ReferenceEntity::Stage => "stages.jsonl",
            ReferenceEntity::Zone => "zones.jsonl",
            ReferenceEntity::TimeRange => "time_ranges.jsonl",
            ReferenceEntity::DropInfo => "drop_infos.jsonl",
        }
    }
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.data_dir.join("reference")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn matrix_dir(&self) -> PathBuf {
        self.data_dir.join("matrix")
    }

    pub fn reference_path(&self, entity: ReferenceEntity) -> PathBuf {
        self.reference_dir().join(entity.filename())
    }

    pub fn reports_path(&self, server: Server) -> PathBuf {
        self.reports_dir().join(format!("{}.jsonl", server))
    }

    pub fn matrix_path(&self, server: Server) -> PathBuf {
        self.matrix_dir().join(format!("{}.jsonl", server))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}
