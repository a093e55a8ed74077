//! Core types and traits for the Hop link shortener.
//!
//! This crate holds the token codec, the link data model, the storage traits
//! and the audit journal shared by the shortener and redirector services.

pub mod audit;
pub mod blacklist;
pub mod codec;
pub mod error;
pub mod link;
pub mod redirector;
pub mod repository;
pub mod shortener;

pub use audit::{AuditEntry, AuditEvent, AuditSink, Journal, LogKind};
pub use blacklist::{Blacklist, BlacklistAdmin};
pub use codec::{decode, LinkId, ShortCode, MAX_LINK_ID};
pub use error::{AuditError, CoreError, LinkError, StorageError};
pub use link::{Hit, LinkRecord, LinkSummary, PageRequest};
pub use redirector::{History, HistoryRequest, ResolveRequest, Resolver};
pub use repository::{BlacklistRepository, CounterStore, LinkRepository};
pub use shortener::{ShortenRequest, ShortenResult, Shortener};
