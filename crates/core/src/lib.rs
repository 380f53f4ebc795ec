//! Core types, limits, and the per-host context aggregate.

pub mod clock;
pub mod error;
pub mod limits;
pub mod models;
pub mod site_context;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use limits::{ResourceLimiter, ResourceLimits};
pub use models::*;
pub use site_context::{CleanupReport, ContextStats, SiteContext, SiteSnapshot};
