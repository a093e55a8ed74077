use async_trait::async_trait;
use hop_core::error::RESOLVE_STORAGE_MESSAGE;
use hop_core::{
    AuditEvent, AuditSink, Blacklist, Hit, Journal, LinkError, LinkRepository, ResolveRequest,
    Resolver, ShortCode, StorageError,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// Service for following short links.
///
/// Each resolution is recorded as a hit on the link before the long URL is
/// returned; the append and the read are a single storage operation.
pub struct RedirectorService<R, A> {
    repository: Arc<R>,
    blacklist: Arc<Blacklist>,
    journal: Journal<A>,
}

impl<R, A> Clone for RedirectorService<R, A> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            blacklist: Arc::clone(&self.blacklist),
            journal: self.journal.clone(),
        }
    }
}

impl<R: LinkRepository, A: AuditSink> RedirectorService<R, A> {
    /// Creates a new RedirectorService with the given repository.
    pub fn new(repository: Arc<R>, blacklist: Arc<Blacklist>, journal: Journal<A>) -> Self {
        Self {
            repository,
            blacklist,
            journal,
        }
    }

    async fn reject<T>(&self, event: AuditEvent, error: LinkError) -> Result<T, LinkError> {
        self.journal.error(event.with_code(error.status())).await?;
        Err(error)
    }
}

#[async_trait]
impl<R: LinkRepository, A: AuditSink> Resolver for RedirectorService<R, A> {
    async fn resolve(&self, request: ResolveRequest) -> Result<String, LinkError> {
        let token = request.token.as_deref();
        let client = request.client.as_deref().filter(|c| !c.is_empty());

        if let Some(client) = client {
            if self.blacklist.is_blacklisted(client) {
                return self
                    .reject(
                        AuditEvent::new("Blacklisted client attempting to connect")
                            .with_client(Some(client))
                            .with_url(token),
                        LinkError::Blacklisted,
                    )
                    .await;
            }
        }

        let Some(code) = token.and_then(|t| ShortCode::parse(t).ok()) else {
            trace!(token = ?token, "unparseable token");
            return self
                .reject(
                    AuditEvent::new("Missing or invalid URI")
                        .with_url(token)
                        .with_client(client),
                    LinkError::NotFound,
                )
                .await;
        };
        let link_id = code.link_id();

        let hit = Hit::now(client, request.user_agent.as_deref());
        let long_link = match self.repository.record_hit(link_id, hit).await {
            Ok(long_link) => long_link,
            Err(StorageError::NotFound(_)) => {
                return self
                    .reject(
                        AuditEvent::new("Missing or invalid URI")
                            .with_client(client)
                            .with_link_id(link_id)
                            .with_error(format!("Long link for ID {link_id} not found")),
                        LinkError::NotFound,
                    )
                    .await;
            }
            Err(e) => {
                return self
                    .reject(
                        AuditEvent::new(format!(
                            "Database error updating resolved link for ID {link_id}"
                        ))
                        .with_client(client)
                        .with_link_id(link_id)
                        .with_error(e),
                        LinkError::Persistence(RESOLVE_STORAGE_MESSAGE),
                    )
                    .await;
            }
        };

        debug!(code = %code, url = %long_link, "Resolved short code");
        self.journal
            .activity(AuditEvent::new("Link hit").with_link_id(link_id))
            .await?;

        Ok(long_link)
    }
}
