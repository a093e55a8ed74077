use hop_core::{CounterStore, LinkId, StorageError};
use hop_promise::Promise;
use std::sync::Arc;
use tracing::trace;

/// Hands out link ids from the shared counter.
#[derive(Debug)]
pub struct Allocator<C> {
    counter: Arc<C>,
}

impl<C> Clone for Allocator<C> {
    fn clone(&self) -> Self {
        Self {
            counter: Arc::clone(&self.counter),
        }
    }
}

impl<C: CounterStore> Allocator<C> {
    pub fn new(counter: Arc<C>) -> Self {
        Self { counter }
    }

    /// Reserves the next id.
    ///
    /// The increment runs as its own task, so it completes even if the caller
    /// stops waiting. Ids are unique and strictly increasing; a failed
    /// increment consumes nothing.
    pub fn next(&self) -> Promise<LinkId, StorageError> {
        let counter = Arc::clone(&self.counter);
        Promise::spawn(async move {
            let id = counter.increment().await?;
            trace!(link_id = id, "allocated link id");
            Ok(id)
        })
    }
}
