use crate::retention::LogRetention;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use hop_core::repository::Result;
use hop_core::{
    AuditEntry, AuditSink, BlacklistRepository, CounterStore, Hit, LinkId, LinkRecord,
    LinkRepository, LinkSummary, LogKind, PageRequest, StorageError,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory implementation of every storage trait.
///
/// Links live in a `DashMap` keyed by id, so hits on different links do not
/// contend. History queries scan all links; this backend is meant for tests
/// and single-process use.
#[derive(Debug)]
pub struct InMemoryStore {
    counter: AtomicU64,
    links: DashMap<LinkId, LinkRecord>,
    blacklist: DashSet<String>,
    activity_log: Mutex<VecDeque<AuditEntry>>,
    error_log: Mutex<VecDeque<AuditEntry>>,
    retention: LogRetention,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_retention(LogRetention::default())
    }

    pub fn with_retention(retention: LogRetention) -> Self {
        Self {
            counter: AtomicU64::new(0),
            links: DashMap::new(),
            blacklist: DashSet::new(),
            activity_log: Mutex::new(VecDeque::new()),
            error_log: Mutex::new(VecDeque::new()),
            retention,
        }
    }

    /// Current counter value, the last id handed out.
    pub fn counter(&self) -> LinkId {
        self.counter.load(Ordering::SeqCst)
    }

    /// Returns a stored record by id.
    pub fn get(&self, link_id: LinkId) -> Option<LinkRecord> {
        self.links.get(&link_id).map(|r| r.value().clone())
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Snapshot of the activity log, oldest first.
    pub fn activity_entries(&self) -> Vec<AuditEntry> {
        self.activity_log.lock().iter().cloned().collect()
    }

    /// Snapshot of the error log, oldest first.
    pub fn error_entries(&self) -> Vec<AuditEntry> {
        self.error_log.lock().iter().cloned().collect()
    }

    fn log(&self, kind: LogKind) -> &Mutex<VecDeque<AuditEntry>> {
        match kind {
            LogKind::Activity => &self.activity_log,
            LogKind::Error => &self.error_log,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryStore {
    async fn increment(&self) -> Result<LinkId> {
        Ok(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl LinkRepository for InMemoryStore {
    async fn insert(&self, record: LinkRecord) -> Result<()> {
        match self.links.entry(record.link_id) {
            Entry::Occupied(_) => Err(StorageError::Operation(format!(
                "link {} already exists",
                record.link_id
            ))),
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            }
        }
    }

    async fn record_hit(&self, link_id: LinkId, hit: Hit) -> Result<String> {
        let mut record = self
            .links
            .get_mut(&link_id)
            .ok_or_else(|| StorageError::NotFound(format!("link {link_id}")))?;
        record.hits.push(hit);
        Ok(record.long_link.clone())
    }

    async fn links_for_client(
        &self,
        client_id: &str,
        page: PageRequest,
    ) -> Result<Vec<LinkSummary>> {
        let mut owned: Vec<LinkRecord> = self
            .links
            .iter()
            .filter(|r| r.client_id == client_id)
            .map(|r| r.value().clone())
            .collect();
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.link_id.cmp(&a.link_id))
        });

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        Ok(owned
            .into_iter()
            .skip(offset)
            .take(page.size as usize)
            .map(LinkSummary::from)
            .collect())
    }
}

#[async_trait]
impl BlacklistRepository for InMemoryStore {
    async fn load(&self) -> Result<Vec<String>> {
        Ok(self.blacklist.iter().map(|c| c.key().clone()).collect())
    }

    async fn add(&self, client_id: &str) -> Result<()> {
        self.blacklist.insert(client_id.to_string());
        Ok(())
    }

    async fn remove(&self, client_id: &str) -> Result<bool> {
        Ok(self.blacklist.remove(client_id).is_some())
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn append(&self, kind: LogKind, entry: AuditEntry) -> Result<()> {
        let capacity = self.retention.capacity(kind);
        let mut log = self.log(kind).lock();
        log.push_back(entry);
        while log.len() > capacity {
            log.pop_front();
        }
        Ok(())
    }
}
