use crate::codec::LinkId;
use crate::error::StorageError;
use crate::link::{Hit, LinkRecord, LinkSummary, PageRequest};
use async_trait::async_trait;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The shared link-id counter.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    /// Atomically increments the counter and returns the new value.
    ///
    /// Must be a single fetch-and-add at the storage boundary. A failed call
    /// must leave the counter where it was.
    async fn increment(&self) -> Result<LinkId>;
}

#[async_trait]
pub trait LinkRepository: Send + Sync + 'static {
    /// Inserts a new link record.
    async fn insert(&self, record: LinkRecord) -> Result<()>;

    /// Appends a hit to the link and returns its long link, as one operation.
    ///
    /// Returns `Err(StorageError::NotFound)` if no link has this id.
    async fn record_hit(&self, link_id: LinkId, hit: Hit) -> Result<String>;

    /// Returns a page of the links created by `client_id`, newest first.
    ///
    /// An unknown client yields an empty page.
    async fn links_for_client(
        &self,
        client_id: &str,
        page: PageRequest,
    ) -> Result<Vec<LinkSummary>>;
}

#[async_trait]
pub trait BlacklistRepository: Send + Sync + 'static {
    /// Loads every blacklisted client id.
    async fn load(&self) -> Result<Vec<String>>;

    /// Persists a client id. Adding an existing id is not an error.
    async fn add(&self, client_id: &str) -> Result<()>;

    /// Removes a client id. Returns `true` if it was present.
    async fn remove(&self, client_id: &str) -> Result<bool>;
}
