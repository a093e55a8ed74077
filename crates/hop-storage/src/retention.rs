use hop_core::LogKind;
use typed_builder::TypedBuilder;

pub const DEFAULT_ACTIVITY_CAPACITY: usize = 50_000;
pub const DEFAULT_ERROR_CAPACITY: usize = 10_000;

/// How many entries each audit log keeps. Older entries are dropped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct LogRetention {
    #[builder(default = DEFAULT_ACTIVITY_CAPACITY)]
    pub activity: usize,
    #[builder(default = DEFAULT_ERROR_CAPACITY)]
    pub error: usize,
}

impl LogRetention {
    pub fn capacity(&self, kind: LogKind) -> usize {
        match kind {
            LogKind::Activity => self.activity,
            LogKind::Error => self.error,
        }
    }
}

impl Default for LogRetention {
    fn default() -> Self {
        Self::builder().build()
    }
}
