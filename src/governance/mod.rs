//! Request governance: rate limiting, concurrency limiting and maintenance
//! mode, independent of any HTTP framework.

mod clock;
mod concurrency;
mod counter;
mod denial;
mod key;
mod limiter;
mod maintenance;
mod pipeline;
mod rules;

pub use clock::{Clock, ManualClock, SystemClock};
pub use concurrency::{ConcurrencyLimiter, ConcurrencyPermit, DEFAULT_MAX_CONCURRENT};
pub use counter::WindowCounter;
pub use denial::{Denial, DenialBody};
pub use key::{derive_key, endpoint_id, Identity, KeyStrategy, RequestDescriptor, UNKNOWN_ADDRESS};
pub use limiter::{spawn_sweeper, RateLimiter};
pub use maintenance::{MaintenanceGate, MaintenanceState, BYPASS_HEADER};
pub use pipeline::{Admission, Governor};
pub use rules::{RateLimitRule, RouteRule, RouteRules, TimeUnit, DEFAULT_RULE_NAME};
