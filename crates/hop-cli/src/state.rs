use crate::cli::{BlacklistAction, Command};
use crate::options::Options;
use hop_core::codec::PATH_PREFIX;
use hop_core::{
    AuditSink, Blacklist, BlacklistAdmin, BlacklistRepository, CounterStore, History,
    HistoryRequest, Journal, LinkError, LinkRepository, ResolveRequest, Resolver, ShortenRequest,
    Shortener,
};
use hop_redirector::{HistoryService, RedirectorService};
use hop_shortener::{Allocator, ShortenerService};
use hop_throttle::Throttle;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// A backend that provides every storage concern.
pub trait Store: LinkRepository + CounterStore + BlacklistRepository + AuditSink {}

impl<S> Store for S where S: LinkRepository + CounterStore + BlacklistRepository + AuditSink {}

/// The services wired against one storage backend.
pub struct AppState<S> {
    blacklist: BlacklistAdmin<S>,
    shortener: ShortenerService<S, S, S>,
    redirector: RedirectorService<S, S>,
    history: HistoryService<S, S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, options: &Options) -> Self {
        let blacklist = Arc::new(Blacklist::new(store.clone()));
        let journal = Journal::new(store.clone());

        let shortener = ShortenerService::builder()
            .settings(options.shortener())
            .repository(store.clone())
            .allocator(Allocator::new(store.clone()))
            .throttle(Arc::new(Throttle::new(options.throttle())))
            .blacklist(blacklist.clone())
            .journal(journal.clone())
            .build();
        let redirector = RedirectorService::new(store.clone(), blacklist.clone(), journal.clone());
        let history = HistoryService::builder()
            .settings(options.history())
            .repository(store)
            .journal(journal.clone())
            .build();
        let blacklist = BlacklistAdmin::new(blacklist, journal);

        Self {
            blacklist,
            shortener,
            redirector,
            history,
        }
    }

    /// Wires the services and loads the persisted blacklist.
    pub async fn bootstrap(store: Arc<S>, options: &Options) -> Result<Self, LinkError> {
        let state = Self::new(store, options);
        let loaded = state.blacklist.init().await?;
        info!(blacklisted = loaded, "loaded blacklist");
        Ok(state)
    }

    /// Runs one command and returns its JSON result.
    pub async fn execute(&self, command: Command) -> Result<Value, LinkError> {
        match command {
            Command::Shorten { url, client } => {
                let result = self.shortener.shorten(ShortenRequest { url, client }).await?;
                Ok(json!({
                    "shortLink": result.short_link,
                    "remaining": result.remaining,
                    "code": 201,
                }))
            }
            Command::Resolve {
                token,
                client,
                user_agent,
            } => {
                let token = token.map(|t| match t.strip_prefix(PATH_PREFIX) {
                    Some(bare) => bare.to_string(),
                    None => t,
                });
                let location = self
                    .redirector
                    .resolve(ResolveRequest {
                        token,
                        client,
                        user_agent,
                    })
                    .await?;
                Ok(json!({ "location": location, "code": 307 }))
            }
            Command::History {
                client_id,
                page,
                page_size,
            } => {
                let links = self
                    .history
                    .links_for_user(HistoryRequest {
                        page_size,
                        ..HistoryRequest::new(client_id, page)
                    })
                    .await?;
                Ok(json!(links))
            }
            Command::Blacklist { action } => self.blacklist(action).await,
        }
    }

    async fn blacklist(&self, action: BlacklistAction) -> Result<Value, LinkError> {
        match action {
            BlacklistAction::Add { client } => {
                self.blacklist.add(&client).await?;
                Ok(json!({ "added": client }))
            }
            BlacklistAction::Remove { client } => {
                let removed = self.blacklist.remove(&client).await?;
                Ok(json!({ "removed": removed, "client": client }))
            }
            BlacklistAction::List => Ok(json!(self.blacklist.entries())),
        }
    }
}
