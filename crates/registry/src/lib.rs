//! Process-wide registry of per-host contexts.
//!
//! Handles:
//! - Creation on first lookup, eviction of the least recently active host
//! - Registry-wide sweeps (field cleanup plus whole-context eviction)
//! - The background cleanup task and its shutdown pass

pub mod config;
pub mod registry;
pub mod scheduler;

pub use config::RegistryConfig;
pub use registry::{ContextRegistry, RegistryStats, SweepSummary};
pub use scheduler::CleanupScheduler;
