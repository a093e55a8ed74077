use crate::codec::LinkId;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Placeholder stored when a hit arrives without a client or user agent.
pub const UNKNOWN: &str = "Unknown";

/// A single resolution of a short link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hit {
    pub client: String,
    pub user_agent: String,
    pub timestamp: Timestamp,
}

impl Hit {
    /// Builds a hit stamped with the current time, substituting [`UNKNOWN`]
    /// for missing fields.
    pub fn now(client: Option<&str>, user_agent: Option<&str>) -> Self {
        Self {
            client: non_empty_or_unknown(client),
            user_agent: non_empty_or_unknown(user_agent),
            timestamp: Timestamp::now(),
        }
    }
}

fn non_empty_or_unknown(value: Option<&str>) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

/// A stored link.
///
/// Created once by the shortener. After that the only mutation is appending
/// to `hits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    #[serde(rename = "linkID")]
    pub link_id: LinkId,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(rename = "shortLink")]
    pub short_link: String,
    #[serde(rename = "longLink")]
    pub long_link: String,
    #[serde(rename = "createDate")]
    pub created_at: Timestamp,
    pub hits: Vec<Hit>,
}

impl LinkRecord {
    /// Creates a record with no hits, stamped with the current time.
    pub fn new(
        link_id: LinkId,
        client_id: impl Into<String>,
        short_link: impl Into<String>,
        long_link: impl Into<String>,
    ) -> Self {
        Self {
            link_id,
            client_id: client_id.into(),
            short_link: short_link.into(),
            long_link: long_link.into(),
            created_at: Timestamp::now(),
            hits: Vec::new(),
        }
    }
}

/// The public view of a link in a client's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSummary {
    #[serde(rename = "shortLink")]
    pub short_link: String,
    #[serde(rename = "longLink")]
    pub long_link: String,
    pub hits: Vec<Hit>,
    #[serde(rename = "createDate")]
    pub created_at: Timestamp,
}

impl From<LinkRecord> for LinkSummary {
    fn from(record: LinkRecord) -> Self {
        Self {
            short_link: record.short_link,
            long_link: record.long_link,
            hits: record.hits,
            created_at: record.created_at,
        }
    }
}

/// A zero-based page of a client's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub index: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(index: u32, size: u32) -> Self {
        Self { index, size }
    }

    /// Number of records to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.index) * u64::from(self.size)
    }
}
