mod clock;
pub mod error;
mod throttle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ThrottleError;
pub use throttle::{Throttle, ThrottleSettings, DEFAULT_LIMIT, DEFAULT_WINDOW};
