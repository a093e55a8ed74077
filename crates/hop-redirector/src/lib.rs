//! Link resolution and history.
//!
//! [`RedirectorService`] turns a token back into its long link, recording a
//! hit on the way. [`HistoryService`] pages through the links a client has
//! created.
//!
//! ```rust
//! use hop_core::{Blacklist, Journal, ResolveRequest, Resolver};
//! use hop_redirector::RedirectorService;
//! use hop_storage::InMemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), hop_core::LinkError> {
//! let store = Arc::new(InMemoryStore::new());
//! let service = RedirectorService::new(
//!     store.clone(),
//!     Arc::new(Blacklist::new(store.clone())),
//!     Journal::new(store.clone()),
//! );
//!
//! let long_link = service.resolve(ResolveRequest::new("2")).await?;
//! println!("Redirect to: {long_link}");
//! # Ok(())
//! # }
//! ```

pub mod history;
pub mod service;

pub use history::{HistoryService, HistorySettings, DEFAULT_STATS_PAGE_LIMIT};
pub use service::RedirectorService;
