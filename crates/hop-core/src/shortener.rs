use crate::error::LinkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters for shortening a URL.
#[derive(Debug, Clone, Default)]
pub struct ShortenRequest {
    /// The long URL, unvalidated.
    pub url: Option<String>,
    /// Identity of the caller, usually its remote address.
    pub client: Option<String>,
}

impl ShortenRequest {
    pub fn new(url: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            client: Some(client.into()),
        }
    }
}

/// A freshly created short link and the caller's remaining quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenResult {
    #[serde(rename = "shortLink")]
    pub short_link: String,
    pub remaining: u32,
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Validates, rate-limits, allocates and persists a new short link.
    async fn shorten(&self, request: ShortenRequest) -> Result<ShortenResult, LinkError>;
}
