//! Game servers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A game server region. Every query and every stored entity is scoped to
/// exactly one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Server {
    CN,
    US,
    JP,
    KR,
}

impl Server {
    /// All known servers, in canonical order.
    pub const ALL: [Server; 4] = [Server::CN, Server::US, Server::JP, Server::KR];

    pub fn as_str(&self) -> &'static str {
        match self {
            Server::CN => "CN",
            Server::US => "US",
            Server::JP => "JP",
            Server::KR => "KR",
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::CN
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known server tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownServer(pub String);

impl fmt::Display for UnknownServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown server: {}", self.0)
    }
}

impl std::error::Error for UnknownServer {}

impl FromStr for Server {
    type Err = UnknownServer;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CN" => Ok(Server::CN),
            "US" => Ok(Server::US),
            "JP" => Ok(Server::JP),
            "KR" => Ok(Server::KR),
            other => Err(UnknownServer(other.to_string())),
        }
    }
}

/// Who a query is scoped to: the whole community or a single account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Account {
    Anonymous,
    Known(i64),
}

impl Account {
    pub fn is_known(&self) -> bool {
        matches!(self, Account::Known(_))
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Account::Anonymous => None,
            Account::Known(id) => Some(*id),
        }
    }
}
