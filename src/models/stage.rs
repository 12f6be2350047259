//! Stage and zone reference data.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Server;

/// A stage (level). Belongs to exactly one zone; the zone decides whether the
/// stage is currently open on a given server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(rename = "stageId")]
    pub stage_id: i32,

    #[serde(rename = "arkStageId")]
    pub ark_stage_id: String,

    #[serde(rename = "zoneId")]
    pub zone_id: i32,

    pub code: String,

    #[serde(rename = "sanityCost")]
    pub sanity_cost: i32,
}

impl Stage {
    pub fn new(stage_id: i32, ark_stage_id: impl Into<String>, zone_id: i32) -> Self {
        let ark_stage_id = ark_stage_id.into();
        Self {
            stage_id,
            code: ark_stage_id.clone(),
            ark_stage_id,
            zone_id,
            sanity_cost: 0,
        }
    }
}

/// Per-server zone availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ZoneExistence {
    pub open: bool,
}

/// A zone: a grouping of stages which opens and closes as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(rename = "zoneId")]
    pub zone_id: i32,

    #[serde(rename = "arkZoneId")]
    pub ark_zone_id: String,

    pub name: String,

    /// Availability per server. Servers absent from the map are closed.
    pub existence: BTreeMap<Server, ZoneExistence>,
}

impl Zone {
    pub fn new(zone_id: i32, ark_zone_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            zone_id,
            ark_zone_id: ark_zone_id.into(),
            name: name.into(),
            existence: BTreeMap::new(),
        }
    }

    /// Mark the zone open on a server.
    pub fn open_on(mut self, server: Server) -> Self {
        self.existence.insert(server, ZoneExistence { open: true });
        self
    }

    pub fn is_open(&self, server: Server) -> bool {
        self.existence.get(&server).map(|e| e.open).unwrap_or(false)
    }
}
