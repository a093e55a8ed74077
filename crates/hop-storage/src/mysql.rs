use crate::retention::LogRetention;
use async_trait::async_trait;
use hop_core::repository::Result;
use hop_core::{
    AuditEntry, AuditSink, BlacklistRepository, CounterStore, Hit, LinkId, LinkRecord,
    LinkRepository, LinkSummary, LogKind, PageRequest, StorageError,
};
use jiff::Timestamp;
use sqlx::mysql::MySqlRow;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row};
use std::collections::HashMap;
use tracing::{debug, info};

const LINKS_COUNTER: &str = "links";

/// Width of the indexed `client_id` columns, in characters.
const CLIENT_ID_WIDTH: usize = 255;

/// Table definitions, one statement per table.
const SCHEMA: [&str; 6] = [
    include_str!("../ddl/mysql/counters.sql"),
    include_str!("../ddl/mysql/links.sql"),
    include_str!("../ddl/mysql/link_hits.sql"),
    include_str!("../ddl/mysql/blacklist.sql"),
    include_str!("../ddl/mysql/activity_log.sql"),
    include_str!("../ddl/mysql/error_log.sql"),
];

/// MySQL implementation of every storage trait.
///
/// Timestamps are stored as milliseconds since the Unix epoch. Hits live in
/// their own table and are only ever inserted; a link row is never updated
/// after creation.
#[derive(Debug, Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
    retention: LogRetention,
}

impl MySqlStore {
    /// Creates a store from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            pool,
            retention: LogRetention::default(),
        }
    }

    /// Creates a store by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    pub fn with_retention(mut self, retention: LogRetention) -> Self {
        self.retention = retention;
        self
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Creates any missing tables and seeds the links counter.
    ///
    /// The `CREATE TABLE` statements are independent and run concurrently.
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.pool.clone();
        hop_promise::when(SCHEMA.into_iter().map(move |ddl| {
            let pool = pool.clone();
            async move {
                sqlx::query(ddl)
                    .execute(&pool)
                    .await
                    .map(|_| ())
                    .map_err(map_sqlx_error)
            }
        }))
        .await?;

        sqlx::query(
            r#"
            INSERT IGNORE INTO counters (tbl, c)
            VALUES (?, 0)
            "#,
        )
        .bind(LINKS_COUNTER)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        info!(tables = SCHEMA.len(), "MySQL schema ready");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => StorageError::InvalidData(message),
        sqlx::Error::RowNotFound => StorageError::NotFound(message),
        _ => StorageError::Query(message),
    }
}

fn timestamp(millis: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(millis)
        .map_err(|e| StorageError::InvalidData(format!("invalid timestamp '{millis}': {e}")))
}

fn log_table(kind: LogKind) -> &'static str {
    match kind {
        LogKind::Activity => "activity_log",
        LogKind::Error => "error_log",
    }
}

fn hit_from_row(row: &MySqlRow) -> Result<(LinkId, Hit)> {
    let link_id: u64 = row.try_get("link_id").map_err(map_sqlx_error)?;
    let hit_at: i64 = row.try_get("hit_at").map_err(map_sqlx_error)?;
    Ok((
        link_id,
        Hit {
            client: row.try_get("client").map_err(map_sqlx_error)?,
            user_agent: row.try_get("user_agent").map_err(map_sqlx_error)?,
            timestamp: timestamp(hit_at)?,
        },
    ))
}

#[async_trait]
impl CounterStore for MySqlStore {
    async fn increment(&self) -> Result<LinkId> {
        // LAST_INSERT_ID(expr) hands the new value back on the same round trip
        let result = sqlx::query(
            r#"
            UPDATE counters
            SET c = LAST_INSERT_ID(c + 1)
            WHERE tbl = ?
            "#,
        )
        .bind(LINKS_COUNTER)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "counter '{LINKS_COUNTER}' is not seeded"
            )));
        }

        Ok(result.last_insert_id())
    }
}

#[async_trait]
impl LinkRepository for MySqlStore {
    async fn insert(&self, record: LinkRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO links (link_id, client_id, short_link, long_link, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.link_id)
        .bind(client_key(&record.client_id))
        .bind(&record.short_link)
        .bind(&record.long_link)
        .bind(record.created_at.as_millisecond())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StorageError::Operation(format!(
                "link {} already exists",
                record.link_id
            ))),
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn record_hit(&self, link_id: LinkId, hit: Hit) -> Result<String> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query(
            r#"
            SELECT long_link
            FROM links
            WHERE link_id = ?
            FOR UPDATE
            "#,
        )
        .bind(link_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Err(StorageError::NotFound(format!("link {link_id}")));
        };
        let long_link: String = row.try_get("long_link").map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO link_hits (link_id, client, user_agent, hit_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(link_id)
        .bind(&hit.client)
        .bind(&hit.user_agent)
        .bind(hit.timestamp.as_millisecond())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(long_link)
    }

    async fn links_for_client(
        &self,
        client_id: &str,
        page: PageRequest,
    ) -> Result<Vec<LinkSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT link_id, short_link, long_link, created_at
            FROM links
            WHERE client_id = ?
            ORDER BY created_at DESC, link_id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(client_key(client_id))
        .bind(u64::from(page.size))
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(rows.len());
        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let link_id: u64 = row.try_get("link_id").map_err(map_sqlx_error)?;
            let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
            ids.push(link_id);
            summaries.push(LinkSummary {
                short_link: row.try_get("short_link").map_err(map_sqlx_error)?,
                long_link: row.try_get("long_link").map_err(map_sqlx_error)?,
                hits: Vec::new(),
                created_at: timestamp(created_at)?,
            });
        }

        let mut query: QueryBuilder<MySql> = QueryBuilder::new(
            "SELECT link_id, client, user_agent, hit_at FROM link_hits WHERE link_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let hit_rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let mut hits: HashMap<LinkId, Vec<Hit>> = HashMap::new();
        for row in &hit_rows {
            let (link_id, hit) = hit_from_row(row)?;
            hits.entry(link_id).or_default().push(hit);
        }
        for (id, summary) in ids.iter().zip(summaries.iter_mut()) {
            summary.hits = hits.remove(id).unwrap_or_default();
        }

        debug!(client_id = %client_id, count = summaries.len(), "loaded link history");
        Ok(summaries)
    }
}

#[async_trait]
impl BlacklistRepository for MySqlStore {
    async fn load(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT client_id FROM blacklist")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| row.try_get("client_id").map_err(map_sqlx_error))
            .collect()
    }

    async fn add(&self, client_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT IGNORE INTO blacklist (client_id, created_at)
            VALUES (?, ?)
            "#,
        )
        .bind(client_key(client_id))
        .bind(Timestamp::now().as_millisecond())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn remove(&self, client_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blacklist WHERE client_id = ?")
            .bind(client_key(client_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditSink for MySqlStore {
    async fn append(&self, kind: LogKind, entry: AuditEntry) -> Result<()> {
        let table = log_table(kind);
        let result = sqlx::query(&format!(
            "INSERT INTO {table} (client, logged_at, msg, code) VALUES (?, ?, ?, ?)"
        ))
        .bind(&entry.client)
        .bind(entry.date.as_millisecond())
        .bind(&entry.msg)
        .bind(entry.code)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        // trim to the newest `capacity` rows
        let capacity = self.retention.capacity(kind) as u64;
        let newest = result.last_insert_id();
        if newest > capacity {
            sqlx::query(&format!("DELETE FROM {table} WHERE id <= ?"))
                .bind(newest - capacity)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }

        Ok(())
    }
}

impl MySqlStore {
    /// Reads back one audit log, oldest first. Used by the CLI and tests.
    pub async fn entries(&self, kind: LogKind) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT client, logged_at, msg, code FROM {} ORDER BY id",
            log_table(kind)
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| -> Result<AuditEntry> {
                let logged_at: i64 = row.try_get("logged_at").map_err(map_sqlx_error)?;
                Ok(AuditEntry {
                    client: row.try_get("client").map_err(map_sqlx_error)?,
                    date: timestamp(logged_at)?,
                    msg: row.try_get("msg").map_err(map_sqlx_error)?,
                    code: row.try_get("code").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }
}

/// Cuts a client id to the indexed column width.
///
/// Reads and writes both go through here, so an over-long id still finds its
/// own rows.
fn client_key(client_id: &str) -> &str {
    match client_id.char_indices().nth(CLIENT_ID_WIDTH) {
        Some((end, _)) => &client_id[..end],
        None => client_id,
    }
}
