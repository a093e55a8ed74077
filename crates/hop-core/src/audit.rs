//! Activity and error logging with an append-only audit trail.

use crate::codec::LinkId;
use crate::error::{AuditError, StorageError};
use crate::link::UNKNOWN;
use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{error, info, warn};

const ACTIVITY_WRITE_FAILED: &str = "Database error writing to the activity log";

/// The two append-only logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Activity,
    Error,
}

/// A persisted audit log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub client: String,
    pub date: Timestamp,
    /// The structured [`AuditEvent`], rendered as JSON.
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl AuditEntry {
    /// Parses the structured event back out of `msg`.
    pub fn event(&self) -> Option<AuditEvent> {
        serde_json::from_str(&self.msg).ok()
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync + 'static {
    async fn append(&self, kind: LogKind, entry: AuditEntry) -> Result<(), StorageError>;
}

/// Something worth recording: what happened plus whatever context is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "linkID", default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<LinkId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl AuditEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_client(mut self, client: Option<&str>) -> Self {
        self.client = client.map(str::to_owned);
        self
    }

    pub fn with_url(mut self, url: Option<&str>) -> Self {
        self.url = url.map(str::to_owned);
        self
    }

    pub fn with_link_id(mut self, link_id: LinkId) -> Self {
        self.link_id = Some(link_id);
        self
    }

    pub fn with_error(mut self, error: impl Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    fn to_entry(&self) -> AuditEntry {
        AuditEntry {
            client: self.client.clone().unwrap_or_else(|| UNKNOWN.to_string()),
            date: Timestamp::now(),
            msg: serde_json::to_string(self).unwrap_or_else(|_| self.message.clone()),
            code: self.code,
        }
    }
}

/// Writes audit events to a sink and mirrors them to `tracing`.
///
/// Activity writes are best effort: a failure is itself recorded in the error
/// log. Error writes must succeed; a failure is returned as [`AuditError`]
/// and callers escalate it.
#[derive(Debug)]
pub struct Journal<A> {
    sink: Arc<A>,
}

impl<A> Clone for Journal<A> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<A: AuditSink> Journal<A> {
    pub fn new(sink: Arc<A>) -> Self {
        Self { sink }
    }

    /// Returns the underlying sink.
    pub fn sink(&self) -> &Arc<A> {
        &self.sink
    }

    /// Records an activity event.
    pub async fn activity(&self, event: AuditEvent) -> Result<(), AuditError> {
        info!(
            client = event.client.as_deref(),
            link_id = event.link_id,
            "{}",
            event.message
        );

        if let Err(e) = self.sink.append(LogKind::Activity, event.to_entry()).await {
            warn!(error = %e, "activity log write failed");
            return self
                .error(
                    AuditEvent::new(ACTIVITY_WRITE_FAILED)
                        .with_client(event.client.as_deref())
                        .with_error(e)
                        .with_code(500),
                )
                .await;
        }

        Ok(())
    }

    /// Records an error event.
    pub async fn error(&self, event: AuditEvent) -> Result<(), AuditError> {
        warn!(
            client = event.client.as_deref(),
            url = event.url.as_deref(),
            link_id = event.link_id,
            error = event.error.as_deref(),
            code = event.code,
            "{}",
            event.message
        );

        self.sink
            .append(LogKind::Error, event.to_entry())
            .await
            .map_err(|source| {
                error!(error = %source, message = %event.message, "error log write failed");
                AuditError { source }
            })
    }
}
