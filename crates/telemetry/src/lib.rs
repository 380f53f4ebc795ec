//! Logging and in-process metrics for the context store.
//!
//! Metrics are plain atomics read by the binary's stats reporter; nothing is
//! exported to an external system.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
