use crate::{
    clock::{Clock, SystemClock},
    error::ThrottleError,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jiff::Timestamp;
use std::time::Duration;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

/// Default number of requests a client may make per window.
pub const DEFAULT_LIMIT: u32 = 25;

/// Default window length, one day.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Configures a [`Throttle`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct ThrottleSettings {
    /// Requests admitted per window. Zero rejects everything.
    #[builder(default = DEFAULT_LIMIT)]
    pub limit: u32,
    /// Length of a window, measured from the first request in it.
    #[builder(default = DEFAULT_WINDOW)]
    pub window: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    start: Timestamp,
}

impl Window {
    fn expired(&self, now: Timestamp, window: Duration) -> bool {
        let elapsed = now.as_millisecond() - self.start.as_millisecond();
        let window = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        elapsed >= window
    }
}

/// Per-client fixed-window request limiter.
///
/// Each client gets a window that opens on its first request and lasts
/// `window`. The check and the increment run under the map shard lock for
/// that client, so concurrent callers for one client never overshoot.
pub struct Throttle<C: Clock = SystemClock> {
    windows: DashMap<String, Window>,
    settings: ThrottleSettings,
    clock: C,
}

impl Throttle<SystemClock> {
    /// Creates a throttle backed by the real system clock.
    pub fn new(settings: ThrottleSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> Throttle<C> {
    pub fn with_clock(settings: ThrottleSettings, clock: C) -> Self {
        Self {
            windows: DashMap::new(),
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &ThrottleSettings {
        &self.settings
    }

    /// Counts a request against the configured limit and window.
    pub fn check_default(&self, client: &str) -> Result<u32, ThrottleError> {
        self.check(client, self.settings.limit, self.settings.window)
    }

    /// Counts a request from `client` and returns how many remain in the
    /// current window.
    ///
    /// A missing or expired window is replaced by a fresh one. Once the
    /// count reaches `limit`, further requests are rejected without being
    /// counted until the window expires.
    pub fn check(&self, client: &str, limit: u32, window: Duration) -> Result<u32, ThrottleError> {
        if limit == 0 {
            return Err(ThrottleError::Exceeded {
                client: client.to_string(),
                limit,
            });
        }

        let now = self.clock.now();
        let count = match self.windows.entry(client.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Window {
                    count: 1,
                    start: now,
                });
                1
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if current.expired(now, window) {
                    trace!(client = %client, "throttle window reset");
                    *current = Window {
                        count: 1,
                        start: now,
                    };
                } else if current.count >= limit {
                    debug!(client = %client, limit, "throttle limit hit");
                    return Err(ThrottleError::Exceeded {
                        client: client.to_string(),
                        limit,
                    });
                } else {
                    current.count += 1;
                }
                current.count
            }
        };

        Ok(limit - count)
    }

    /// Drops every window that has expired under the configured length.
    /// Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| !w.expired(now, self.settings.window));
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients with a tracked window.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
