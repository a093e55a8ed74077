use crate::allocator::Allocator;
use crate::validation::validate_url;
use async_trait::async_trait;
use hop_core::error::SHORTEN_STORAGE_MESSAGE;
use hop_core::{
    AuditEvent, AuditSink, Blacklist, CounterStore, Journal, LinkError, LinkRecord,
    LinkRepository, ShortCode, ShortenRequest, ShortenResult, Shortener,
};
use hop_throttle::Throttle;
use std::sync::Arc;
use tracing::debug;
use typed_builder::TypedBuilder;

/// Host that short links are served from when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://kili.us";

#[derive(Debug, Clone, TypedBuilder)]
pub struct ShortenerSettings {
    /// Prefix of every short link, without the trailing `/+/`.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
}

impl Default for ShortenerSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A concrete implementation of the `Shortener` trait.
///
/// Every request runs the same steps in order: blacklist, URL validation,
/// client validation, throttle, id allocation, encoding and persistence.
/// The first failing step ends the request and is written to the error log.
#[derive(TypedBuilder)]
pub struct ShortenerService<R, C, A> {
    #[builder(default)]
    settings: ShortenerSettings,
    repository: Arc<R>,
    allocator: Allocator<C>,
    throttle: Arc<Throttle>,
    blacklist: Arc<Blacklist>,
    journal: Journal<A>,
}

impl<R, C, A> ShortenerService<R, C, A>
where
    R: LinkRepository,
    C: CounterStore,
    A: AuditSink,
{
    /// Logs `event` to the error log and fails the request with `error`.
    ///
    /// If the error log itself cannot be written, that failure wins.
    async fn reject<T>(&self, event: AuditEvent, error: LinkError) -> Result<T, LinkError> {
        self.journal.error(event.with_code(error.status())).await?;
        Err(error)
    }
}

#[async_trait]
impl<R, C, A> Shortener for ShortenerService<R, C, A>
where
    R: LinkRepository,
    C: CounterStore,
    A: AuditSink,
{
    async fn shorten(&self, request: ShortenRequest) -> Result<ShortenResult, LinkError> {
        let url = request.url.as_deref();
        let client = request.client.as_deref().filter(|c| !c.is_empty());

        if let Some(client) = client {
            if self.blacklist.is_blacklisted(client) {
                return self
                    .reject(
                        AuditEvent::new("Blacklisted client attempting to connect")
                            .with_client(Some(client))
                            .with_url(url),
                        LinkError::Blacklisted,
                    )
                    .await;
            }
        }

        let long_link = match url.map(|u| (u, validate_url(u))) {
            Some((u, Ok(_))) => u,
            Some((_, Err(e))) => {
                debug!(error = %e, "url rejected");
                return self
                    .reject(
                        AuditEvent::new("Failed URL validation")
                            .with_client(client)
                            .with_url(url)
                            .with_error(e),
                        LinkError::InvalidUrl,
                    )
                    .await;
            }
            None => {
                return self
                    .reject(
                        AuditEvent::new("Failed URL validation").with_client(client),
                        LinkError::InvalidUrl,
                    )
                    .await;
            }
        };

        let Some(client) = client else {
            return self
                .reject(
                    AuditEvent::new("Failed client validation").with_url(url),
                    LinkError::MissingClient,
                )
                .await;
        };

        let remaining = match self.throttle.check_default(client) {
            Ok(remaining) => remaining,
            Err(_) => {
                return self
                    .reject(
                        AuditEvent::new("User data throttle limit hit")
                            .with_client(Some(client))
                            .with_url(url),
                        LinkError::ThrottleExceeded,
                    )
                    .await;
            }
        };

        let link_id = match self.allocator.next().await {
            Ok(id) => id,
            Err(e) => {
                return self
                    .reject(
                        AuditEvent::new("Database error incrementing links counter")
                            .with_client(Some(client))
                            .with_error(e),
                        LinkError::Persistence(SHORTEN_STORAGE_MESSAGE),
                    )
                    .await;
            }
        };

        let code = match ShortCode::encode(link_id) {
            Ok(code) => code,
            Err(e) => {
                return self
                    .reject(
                        AuditEvent::new("Link id space exhausted")
                            .with_client(Some(client))
                            .with_link_id(link_id)
                            .with_error(e),
                        LinkError::Persistence(SHORTEN_STORAGE_MESSAGE),
                    )
                    .await;
            }
        };
        let short_link = code.to_url(&self.settings.base_url);

        let record = LinkRecord::new(link_id, client, short_link.clone(), long_link);
        if let Err(e) = self.repository.insert(record).await {
            return self
                .reject(
                    AuditEvent::new("Database error inserting into links database")
                        .with_client(Some(client))
                        .with_link_id(link_id)
                        .with_error(e),
                    LinkError::Persistence(SHORTEN_STORAGE_MESSAGE),
                )
                .await;
        }

        self.journal
            .activity(
                AuditEvent::new("Link created")
                    .with_client(Some(client))
                    .with_link_id(link_id),
            )
            .await?;

        Ok(ShortenResult {
            short_link,
            remaining,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hop_core::{LinkId, LogKind, StorageError};
    use hop_storage::InMemoryStore;
    use hop_throttle::ThrottleSettings;
    use std::collections::HashSet;
    use std::time::Duration;

    type Service = ShortenerService<InMemoryStore, InMemoryStore, InMemoryStore>;

    struct Harness {
        store: Arc<InMemoryStore>,
        blacklist: Arc<Blacklist>,
        service: Service,
    }

    fn harness(throttle: ThrottleSettings) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let blacklist = Arc::new(Blacklist::new(store.clone()));
        let service = ShortenerService::builder()
            .repository(store.clone())
            .allocator(Allocator::new(store.clone()))
            .throttle(Arc::new(Throttle::new(throttle)))
            .blacklist(blacklist.clone())
            .journal(Journal::new(store.clone()))
            .build();
        Harness {
            store,
            blacklist,
            service,
        }
    }

    fn default_harness() -> Harness {
        harness(ThrottleSettings::default())
    }

    fn last_error_message(store: &InMemoryStore) -> (String, Option<u16>) {
        let entry = store.error_entries().pop().expect("an error entry");
        (entry.event().unwrap().message, entry.code)
    }

    #[tokio::test]
    async fn first_link_uses_second_token() {
        let h = default_harness();
        let result = h
            .service
            .shorten(ShortenRequest::new("http://github.com", "192.168.1.1"))
            .await
            .unwrap();

        assert_eq!(result.short_link, "http://kili.us/+/2");
        assert_eq!(result.remaining, 24);

        let record = h.store.get(1).unwrap();
        assert_eq!(record.long_link, "http://github.com");
        assert_eq!(record.client_id, "192.168.1.1");
        assert!(record.hits.is_empty());

        let activity = h.store.activity_entries();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].event().unwrap().message, "Link created");
        assert!(h.store.error_entries().is_empty());
    }

    #[tokio::test]
    async fn invalid_url_never_allocates() {
        let h = default_harness();
        let err = h
            .service
            .shorten(ShortenRequest::new("abc123", "192.168.1.1"))
            .await
            .unwrap_err();

        assert_eq!(
            err.into_parts(),
            ("Oops. You've entered an invalid URL.", 400)
        );
        assert_eq!(h.store.counter(), 0);

        let entry = h.store.error_entries().pop().unwrap();
        let event = entry.event().unwrap();
        assert_eq!(event.message, "Failed URL validation");
        assert_eq!(event.client.as_deref(), Some("192.168.1.1"));
        assert_eq!(event.url.as_deref(), Some("abc123"));
        assert_eq!(entry.code, Some(400));
    }

    #[tokio::test]
    async fn missing_url_is_invalid() {
        let h = default_harness();
        let err = h
            .service
            .shorten(ShortenRequest {
                url: None,
                client: Some("c".to_string()),
            })
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::InvalidUrl);
    }

    #[tokio::test]
    async fn missing_client_is_rejected() {
        let h = default_harness();
        for client in [None, Some(String::new())] {
            let err = h
                .service
                .shorten(ShortenRequest {
                    url: Some("http://www.hp.com".to_string()),
                    client,
                })
                .await
                .unwrap_err();
            assert_eq!(err.into_parts(), ("Validation error", 400));
        }

        let entry = h.store.error_entries().pop().unwrap();
        let event = entry.event().unwrap();
        assert_eq!(event.message, "Failed client validation");
        assert_eq!(event.url.as_deref(), Some("http://www.hp.com"));
        assert_eq!(h.store.counter(), 0);
    }

    #[tokio::test]
    async fn blacklisted_client_is_forbidden() {
        let h = default_harness();
        h.blacklist.add("10.6.6.6").await.unwrap();

        let err = h
            .service
            .shorten(ShortenRequest::new("http://github.com", "10.6.6.6"))
            .await
            .unwrap_err();

        assert_eq!(err.into_parts(), ("Forbidden", 403));
        assert_eq!(
            last_error_message(&h.store),
            (
                "Blacklisted client attempting to connect".to_string(),
                Some(403)
            )
        );
        assert_eq!(h.store.counter(), 0);
    }

    #[tokio::test]
    async fn throttle_is_per_client() {
        let h = harness(ThrottleSettings::builder().limit(1).build());

        let first = h
            .service
            .shorten(ShortenRequest::new("http://github.com", "X"))
            .await
            .unwrap();
        assert_eq!(first.remaining, 0);

        let other = h
            .service
            .shorten(ShortenRequest::new("http://jeffhorak.com", "Y"))
            .await
            .unwrap();
        assert_eq!(other.short_link, "http://kili.us/+/3");

        let err = h
            .service
            .shorten(ShortenRequest::new("http://kili.us", "X"))
            .await
            .unwrap_err();
        assert_eq!(
            err.into_parts(),
            (
                "Pace yourself. You've reached your daily shortening limit.",
                429
            )
        );

        let entry = h.store.error_entries().pop().unwrap();
        let event = entry.event().unwrap();
        assert_eq!(event.message, "User data throttle limit hit");
        assert_eq!(event.client.as_deref(), Some("X"));
        assert_eq!(event.url.as_deref(), Some("http://kili.us"));
    }

    #[tokio::test]
    async fn throttle_window_expires() {
        let h = harness(
            ThrottleSettings::builder()
                .limit(1)
                .window(Duration::from_millis(50))
                .build(),
        );
        let request = || ShortenRequest::new("http://github.com", "192.168.1.1");

        h.service.shorten(request()).await.unwrap();
        assert_eq!(
            h.service.shorten(request()).await.unwrap_err(),
            LinkError::ThrottleExceeded
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        let again = h.service.shorten(request()).await.unwrap();
        assert_eq!(again.remaining, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_shortens_get_distinct_links() {
        let h = default_harness();
        let service = Arc::new(h.service);

        let mut handles = Vec::new();
        for i in 0..100 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .shorten(ShortenRequest::new(
                        format!("http://example.com/{i}"),
                        format!("10.0.0.{i}"),
                    ))
                    .await
                    .unwrap()
                    .short_link
            }));
        }

        let mut links = HashSet::new();
        for handle in handles {
            assert!(links.insert(handle.await.unwrap()));
        }
        assert_eq!(h.store.link_count(), 100);
    }

    struct OfflineCounter;

    #[async_trait]
    impl CounterStore for OfflineCounter {
        async fn increment(&self) -> Result<LinkId, StorageError> {
            Err(StorageError::Unavailable("counter offline".to_string()))
        }
    }

    struct ReadOnlyLinks;

    #[async_trait]
    impl LinkRepository for ReadOnlyLinks {
        async fn insert(&self, _record: LinkRecord) -> Result<(), StorageError> {
            Err(StorageError::Query("read-only".to_string()))
        }

        async fn record_hit(
            &self,
            link_id: LinkId,
            _hit: hop_core::Hit,
        ) -> Result<String, StorageError> {
            Err(StorageError::NotFound(link_id.to_string()))
        }

        async fn links_for_client(
            &self,
            _client_id: &str,
            _page: hop_core::PageRequest,
        ) -> Result<Vec<hop_core::LinkSummary>, StorageError> {
            Ok(Vec::new())
        }
    }

    struct DeadSink;

    #[async_trait]
    impl AuditSink for DeadSink {
        async fn append(
            &self,
            _kind: LogKind,
            _entry: hop_core::AuditEntry,
        ) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("log offline".to_string()))
        }
    }

    #[tokio::test]
    async fn counter_failure_is_a_server_error() {
        let store = Arc::new(InMemoryStore::new());
        let service = ShortenerService::builder()
            .repository(store.clone())
            .allocator(Allocator::new(Arc::new(OfflineCounter)))
            .throttle(Arc::new(Throttle::new(ThrottleSettings::default())))
            .blacklist(Arc::new(Blacklist::new(store.clone())))
            .journal(Journal::new(store.clone()))
            .build();

        let err = service
            .shorten(ShortenRequest::new("http://github.com", "c"))
            .await
            .unwrap_err();

        assert_eq!(
            err.into_parts(),
            ("A database error occurred while shortening the link", 500)
        );
        let entry = store.error_entries().pop().unwrap();
        let event = entry.event().unwrap();
        assert_eq!(event.message, "Database error incrementing links counter");
        assert!(event.error.unwrap().contains("counter offline"));
        assert_eq!(store.link_count(), 0);
    }

    #[tokio::test]
    async fn insert_failure_is_a_server_error() {
        let store = Arc::new(InMemoryStore::new());
        let service = ShortenerService::builder()
            .repository(Arc::new(ReadOnlyLinks))
            .allocator(Allocator::new(store.clone()))
            .throttle(Arc::new(Throttle::new(ThrottleSettings::default())))
            .blacklist(Arc::new(Blacklist::new(store.clone())))
            .journal(Journal::new(store.clone()))
            .build();

        let err = service
            .shorten(ShortenRequest::new("http://github.com", "c"))
            .await
            .unwrap_err();

        assert_eq!(err, LinkError::Persistence(SHORTEN_STORAGE_MESSAGE));
        assert_eq!(
            last_error_message(&store),
            (
                "Database error inserting into links database".to_string(),
                Some(500)
            )
        );
    }

    #[tokio::test]
    async fn lost_error_log_escalates() {
        let store = Arc::new(InMemoryStore::new());
        let service = ShortenerService::builder()
            .repository(store.clone())
            .allocator(Allocator::new(store.clone()))
            .throttle(Arc::new(Throttle::new(ThrottleSettings::default())))
            .blacklist(Arc::new(Blacklist::new(store.clone())))
            .journal(Journal::new(Arc::new(DeadSink)))
            .build();

        let err = service
            .shorten(ShortenRequest::new("ftp://github.com", "c"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.status(), 500);

        // a successful shorten still fails once both logs are gone
        let err = service
            .shorten(ShortenRequest::new("http://github.com", "c"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(store.link_count(), 1);
    }

    #[tokio::test]
    async fn custom_base_url() {
        let store = Arc::new(InMemoryStore::new());
        let service = ShortenerService::builder()
            .settings(
                ShortenerSettings::builder()
                    .base_url("https://hop.example")
                    .build(),
            )
            .repository(store.clone())
            .allocator(Allocator::new(store.clone()))
            .throttle(Arc::new(Throttle::new(ThrottleSettings::default())))
            .blacklist(Arc::new(Blacklist::new(store.clone())))
            .journal(Journal::new(store.clone()))
            .build();

        let result = service
            .shorten(ShortenRequest::new("http://github.com", "c"))
            .await
            .unwrap();
        assert_eq!(result.short_link, "https://hop.example/+/2");
        assert_eq!(store.activity_entries().len(), 1);
        assert_eq!(store.activity_entries()[0].client, "c");
    }
}
