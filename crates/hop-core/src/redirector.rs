use crate::error::LinkError;
use crate::link::LinkSummary;
use async_trait::async_trait;

/// A request to follow a short link.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Bare token, without the `/+/` prefix.
    pub token: Option<String>,
    pub client: Option<String>,
    pub user_agent: Option<String>,
}

impl ResolveRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// A request for one page of a client's link history.
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub client_id: String,
    /// Zero-based page index.
    pub page: u32,
    /// Falls back to the configured page size when `None`.
    pub page_size: Option<u32>,
}

impl HistoryRequest {
    pub fn new(client_id: impl Into<String>, page: u32) -> Self {
        Self {
            client_id: client_id.into(),
            page,
            page_size: None,
        }
    }
}

#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Records a hit and returns the long link.
    async fn resolve(&self, request: ResolveRequest) -> Result<String, LinkError>;
}

#[async_trait]
pub trait History: Send + Sync + 'static {
    /// Returns a page of the client's links, newest first.
    async fn links_for_user(&self, request: HistoryRequest)
        -> Result<Vec<LinkSummary>, LinkError>;
}
