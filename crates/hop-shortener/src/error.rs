use thiserror::Error;

/// Reasons a long URL is refused.
///
/// Only used for logging; clients always see the same generic message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("URL cannot be empty")]
    Empty,
    #[error("URL is {length} characters long, the limit is {max}")]
    TooLong { length: usize, max: usize },
    #[error("URL must start with http:// or https://")]
    Scheme,
    #[error("invalid URL format: {0}")]
    Format(#[from] url::ParseError),
    #[error("URL has no host")]
    MissingHost,
    #[error("invalid host '{0}'")]
    Host(String),
}
