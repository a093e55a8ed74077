use async_trait::async_trait;
use hop_core::error::HISTORY_STORAGE_MESSAGE;
use hop_core::{
    AuditEvent, AuditSink, History, HistoryRequest, Journal, LinkError, LinkRepository,
    LinkSummary, PageRequest,
};
use std::sync::Arc;
use tracing::debug;
use typed_builder::TypedBuilder;

/// Page size used when a history request does not carry one.
pub const DEFAULT_STATS_PAGE_LIMIT: u32 = 20;

#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct HistorySettings {
    #[builder(default = DEFAULT_STATS_PAGE_LIMIT)]
    pub stats_page_limit: u32,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Pages through the links a client has created, newest first.
#[derive(TypedBuilder)]
pub struct HistoryService<R, A> {
    #[builder(default)]
    settings: HistorySettings,
    repository: Arc<R>,
    journal: Journal<A>,
}

#[async_trait]
impl<R: LinkRepository, A: AuditSink> History for HistoryService<R, A> {
    async fn links_for_user(&self, request: HistoryRequest) -> Result<Vec<LinkSummary>, LinkError> {
        let client = request.client_id.as_str();
        let size = request
            .page_size
            .unwrap_or(self.settings.stats_page_limit);
        let page = PageRequest::new(request.page, size);

        let links = match self.repository.links_for_client(client, page).await {
            Ok(links) => links,
            Err(e) => {
                let error = LinkError::Persistence(HISTORY_STORAGE_MESSAGE);
                self.journal
                    .error(
                        AuditEvent::new(HISTORY_STORAGE_MESSAGE)
                            .with_client(Some(client))
                            .with_error(e)
                            .with_code(error.status()),
                    )
                    .await?;
                return Err(error);
            }
        };

        debug!(client, page = page.index, count = links.len(), "Fetched history page");
        self.journal
            .activity(AuditEvent::new("Fetched links for user").with_client(Some(client)))
            .await?;

        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hop_core::{Hit, LinkId, LinkRecord, StorageError};
    use hop_storage::InMemoryStore;
    use jiff::{SignedDuration, Timestamp};

    fn service(store: &Arc<InMemoryStore>) -> HistoryService<InMemoryStore, InMemoryStore> {
        HistoryService::builder()
            .repository(store.clone())
            .journal(Journal::new(store.clone()))
            .build()
    }

    async fn seed(store: &InMemoryStore, client: &str, ids: impl IntoIterator<Item = LinkId>) {
        let epoch = Timestamp::from_second(1_700_000_000).unwrap();
        for id in ids {
            let mut record = LinkRecord::new(
                id,
                client,
                format!("http://kili.us/+/{id}"),
                format!("http://example.com/{id}"),
            );
            record.created_at = epoch + SignedDuration::from_secs(id as i64);
            store.insert(record).await.unwrap();
        }
    }

    fn longs(links: &[LinkSummary]) -> Vec<&str> {
        links.iter().map(|l| l.long_link.as_str()).collect()
    }

    #[tokio::test]
    async fn newest_first_with_default_page_size() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "alice", 1..=25).await;
        seed(&store, "bob", 26..=27).await;
        let service = service(&store);

        let first = service
            .links_for_user(HistoryRequest::new("alice", 0))
            .await
            .unwrap();
        assert_eq!(first.len(), 20);
        assert_eq!(first[0].long_link, "http://example.com/25");
        assert_eq!(first[19].long_link, "http://example.com/6");

        let second = service
            .links_for_user(HistoryRequest::new("alice", 1))
            .await
            .unwrap();
        assert_eq!(
            longs(&second),
            vec![
                "http://example.com/5",
                "http://example.com/4",
                "http://example.com/3",
                "http://example.com/2",
                "http://example.com/1",
            ]
        );

        let past_end = service
            .links_for_user(HistoryRequest::new("alice", 2))
            .await
            .unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn explicit_page_size_wins() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "alice", 1..=5).await;
        let service = HistoryService::builder()
            .settings(HistorySettings::builder().stats_page_limit(100).build())
            .repository(store.clone())
            .journal(Journal::new(store.clone()))
            .build();

        let request = HistoryRequest {
            page_size: Some(2),
            ..HistoryRequest::new("alice", 1)
        };
        let links = service.links_for_user(request).await.unwrap();
        assert_eq!(
            longs(&links),
            vec!["http://example.com/3", "http://example.com/2"]
        );
    }

    #[tokio::test]
    async fn unknown_client_has_empty_history() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "alice", 1..=3).await;

        let links = service(&store)
            .links_for_user(HistoryRequest::new("nobody", 0))
            .await
            .unwrap();
        assert!(links.is_empty());

        let event = store.activity_entries().pop().unwrap().event().unwrap();
        assert_eq!(event.message, "Fetched links for user");
        assert_eq!(event.client.as_deref(), Some("nobody"));
    }

    #[tokio::test]
    async fn summaries_carry_hits() {
        let store = Arc::new(InMemoryStore::new());
        seed(&store, "alice", [7]).await;
        store
            .record_hit(7, Hit::now(Some("10.0.0.9"), Some("curl/8")))
            .await
            .unwrap();

        let links = service(&store)
            .links_for_user(HistoryRequest::new("alice", 0))
            .await
            .unwrap();
        assert_eq!(links[0].short_link, "http://kili.us/+/7");
        assert_eq!(links[0].hits.len(), 1);
        assert_eq!(links[0].hits[0].user_agent, "curl/8");
    }

    struct BrokenLinks;

    #[async_trait]
    impl LinkRepository for BrokenLinks {
        async fn insert(&self, _record: LinkRecord) -> Result<(), StorageError> {
            Ok(())
        }

        async fn record_hit(&self, _link_id: LinkId, _hit: Hit) -> Result<String, StorageError> {
            Err(StorageError::NotFound("unused".to_string()))
        }

        async fn links_for_client(
            &self,
            _client_id: &str,
            _page: PageRequest,
        ) -> Result<Vec<LinkSummary>, StorageError> {
            Err(StorageError::Query("table links doesn't exist".to_string()))
        }
    }

    #[tokio::test]
    async fn storage_failure_is_logged() {
        let store = Arc::new(InMemoryStore::new());
        let service = HistoryService::builder()
            .repository(Arc::new(BrokenLinks))
            .journal(Journal::new(store.clone()))
            .build();

        let err = service
            .links_for_user(HistoryRequest::new("alice", 0))
            .await
            .unwrap_err();
        assert_eq!(err.into_parts(), ("Database error", 500));

        let entry = store.error_entries().pop().unwrap();
        assert_eq!(entry.code, Some(500));
        assert_eq!(entry.client, "alice");
        assert!(entry.event().unwrap().error.unwrap().contains("links"));
        assert!(store.activity_entries().is_empty());
    }
}
