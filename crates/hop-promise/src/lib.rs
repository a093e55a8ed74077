//! A settle-once promise and an ordered, fail-fast join over tokio tasks.

pub mod promise;
pub mod when;

pub use promise::{Promise, Status, Wait};
pub use when::{all, when};

#[doc(hidden)]
pub mod __private {
    pub use futures::future::FutureExt;
}
