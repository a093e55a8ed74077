//! URL shortener service implementation.
//!
//! This crate provides the id allocator, long-URL validation and the
//! shortener service built on top of them.

pub mod allocator;
pub mod error;
pub mod service;
pub mod validation;

pub use allocator::Allocator;
pub use error::UrlError;
pub use service::{ShortenerService, ShortenerSettings, DEFAULT_BASE_URL};
pub use validation::{validate_url, MAX_URL_LENGTH};
