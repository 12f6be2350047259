//! Player-submitted drop reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Server;

/// One dropped item inside a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drop {
    #[serde(rename = "itemId")]
    pub item_id: i32,

    pub quantity: i64,
}

/// A user-submitted observation of one stage clear. Reception and validation
/// happen upstream; the core only aggregates over the stored corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropReport {
    #[serde(rename = "reportId")]
    pub report_id: i64,

    pub server: Server,

    #[serde(rename = "stageId")]
    pub stage_id: i32,

    /// Number of clears this report covers.
    pub times: i64,

    pub drops: Vec<Drop>,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "accountId")]
    pub account_id: Option<i64>,

    /// Unreliable reports are excluded from every aggregate.
    pub reliable: bool,
}

impl DropReport {
    pub fn new(
        report_id: i64,
        server: Server,
        stage_id: i32,
        drops: Vec<Drop>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            report_id,
            server,
            stage_id,
            times: 1,
            drops,
            created_at,
            account_id: None,
            reliable: true,
        }
    }

    pub fn with_account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }
}
