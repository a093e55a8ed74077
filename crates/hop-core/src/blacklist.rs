use crate::audit::{AuditEvent, AuditSink, Journal};
use crate::error::{LinkError, StorageError, BLACKLIST_STORAGE_MESSAGE};
use crate::repository::BlacklistRepository;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Set of clients that may neither shorten nor resolve.
///
/// Membership checks hit the in-memory set only. Writes go to the repository
/// first so the set never holds an entry that was not persisted.
pub struct Blacklist {
    clients: DashSet<String>,
    repository: Arc<dyn BlacklistRepository>,
}

impl Blacklist {
    pub fn new(repository: Arc<dyn BlacklistRepository>) -> Self {
        Self {
            clients: DashSet::new(),
            repository,
        }
    }

    /// Loads every persisted entry into memory.
    pub async fn init(&self) -> Result<usize, StorageError> {
        let loaded = self.repository.load().await?;
        for client in loaded {
            self.clients.insert(client);
        }
        info!(count = self.clients.len(), "Blacklist loaded");
        Ok(self.clients.len())
    }

    pub fn is_blacklisted(&self, client: &str) -> bool {
        self.clients.contains(client)
    }

    pub async fn add(&self, client: &str) -> Result<(), StorageError> {
        self.repository.add(client).await?;
        self.clients.insert(client.to_string());
        debug!(client = %client, "client blacklisted");
        Ok(())
    }

    /// Returns `true` if the client was blacklisted.
    pub async fn remove(&self, client: &str) -> Result<bool, StorageError> {
        let removed = self.repository.remove(client).await?;
        self.clients.remove(client);
        debug!(client = %client, removed, "client removed from blacklist");
        Ok(removed)
    }

    /// Snapshot of the current entries, sorted.
    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self.clients.iter().map(|c| c.key().clone()).collect();
        entries.sort();
        entries
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for Blacklist {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blacklist")
            .field("len", &self.clients.len())
            .finish_non_exhaustive()
    }
}

/// Blacklist maintenance that reports storage failures to the error log.
pub struct BlacklistAdmin<A> {
    blacklist: Arc<Blacklist>,
    journal: Journal<A>,
}

impl<A: AuditSink> BlacklistAdmin<A> {
    pub fn new(blacklist: Arc<Blacklist>, journal: Journal<A>) -> Self {
        Self { blacklist, journal }
    }

    pub fn blacklist(&self) -> &Arc<Blacklist> {
        &self.blacklist
    }

    pub async fn init(&self) -> Result<usize, LinkError> {
        match self.blacklist.init().await {
            Ok(count) => Ok(count),
            Err(e) => self.fail("Database error loading the blacklist", None, e).await,
        }
    }

    pub async fn add(&self, client: &str) -> Result<(), LinkError> {
        match self.blacklist.add(client).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail("Database error adding client to the blacklist", Some(client), e)
                    .await
            }
        }
    }

    pub async fn remove(&self, client: &str) -> Result<bool, LinkError> {
        match self.blacklist.remove(client).await {
            Ok(removed) => Ok(removed),
            Err(e) => {
                self.fail(
                    "Database error removing client from the blacklist",
                    Some(client),
                    e,
                )
                .await
            }
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.blacklist.entries()
    }

    async fn fail<T>(
        &self,
        message: &str,
        client: Option<&str>,
        error: StorageError,
    ) -> Result<T, LinkError> {
        let rejection = LinkError::Persistence(BLACKLIST_STORAGE_MESSAGE);
        self.journal
            .error(
                AuditEvent::new(message)
                    .with_client(client)
                    .with_error(error)
                    .with_code(rejection.status()),
            )
            .await?;
        Err(rejection)
    }
}
