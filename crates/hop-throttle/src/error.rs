use thiserror::Error;

/// Errors returned by the throttle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("client {client} reached the limit of {limit} requests per window")]
    Exceeded { client: String, limit: u32 },
}
