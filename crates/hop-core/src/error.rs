use crate::codec::LinkId;
use thiserror::Error;

/// Errors raised by the codec.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid short code: {0}")]
    InvalidShortCode(String),
    #[error("link id {0} is outside the encodable range")]
    LinkIdOutOfRange(LinkId),
}

/// Errors reported by a storage backend.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

/// Raised when an entry could not be written to the error sink.
///
/// Losing audit entries is not tolerated, so this is never swallowed.
#[derive(Debug, Clone, Error)]
#[error("failed to write the error log: {source}")]
pub struct AuditError {
    #[source]
    pub source: StorageError,
}

pub const INVALID_URL_MESSAGE: &str = "Oops. You've entered an invalid URL.";
pub const VALIDATION_MESSAGE: &str = "Validation error";
pub const FORBIDDEN_MESSAGE: &str = "Forbidden";
pub const THROTTLED_MESSAGE: &str = "Pace yourself. You've reached your daily shortening limit.";
pub const NOT_FOUND_MESSAGE: &str = "Missing or invalid URI";
pub const SHORTEN_STORAGE_MESSAGE: &str = "A database error occurred while shortening the link";
pub const RESOLVE_STORAGE_MESSAGE: &str = "A database error occurred while resolving the link";
pub const HISTORY_STORAGE_MESSAGE: &str = "Database error";
pub const BLACKLIST_STORAGE_MESSAGE: &str = "A database error occurred while updating the blacklist";
const AUDIT_LOST_MESSAGE: &str = "An internal error occurred";

/// Request-level failure surfaced to callers as a `(message, status)` pair.
///
/// `Display` carries diagnostic text; use [`LinkError::client_message`] for
/// anything shown to a client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Oops. You've entered an invalid URL.")]
    InvalidUrl,
    #[error("Validation error")]
    MissingClient,
    #[error("Forbidden")]
    Blacklisted,
    #[error("Pace yourself. You've reached your daily shortening limit.")]
    ThrottleExceeded,
    #[error("Missing or invalid URI")]
    NotFound,
    #[error("{0}")]
    Persistence(&'static str),
    #[error("audit trail lost: {0}")]
    AuditLost(String),
}

impl LinkError {
    /// HTTP-style status code for this failure.
    pub fn status(&self) -> u16 {
        match self {
            LinkError::InvalidUrl | LinkError::MissingClient => 400,
            LinkError::Blacklisted => 403,
            LinkError::NotFound => 404,
            LinkError::ThrottleExceeded => 429,
            LinkError::Persistence(_) | LinkError::AuditLost(_) => 500,
        }
    }

    /// Message that is safe to hand to a client.
    pub fn client_message(&self) -> &'static str {
        match self {
            LinkError::InvalidUrl => INVALID_URL_MESSAGE,
            LinkError::MissingClient => VALIDATION_MESSAGE,
            LinkError::Blacklisted => FORBIDDEN_MESSAGE,
            LinkError::ThrottleExceeded => THROTTLED_MESSAGE,
            LinkError::NotFound => NOT_FOUND_MESSAGE,
            LinkError::Persistence(message) => message,
            LinkError::AuditLost(_) => AUDIT_LOST_MESSAGE,
        }
    }

    /// Whether the failure means the audit trail is incomplete.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::AuditLost(_))
    }

    /// Splits the error into the `(message, status)` pair handed to the transport.
    pub fn into_parts(self) -> (&'static str, u16) {
        (self.client_message(), self.status())
    }
}

impl From<AuditError> for LinkError {
    fn from(error: AuditError) -> Self {
        LinkError::AuditLost(error.to_string())
    }
}
