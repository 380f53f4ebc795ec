//! Registry configuration.

use std::time::Duration;

use context_core::ResourceLimits;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegistryConfig {
    /// Maximum number of hosts tracked at once
    #[serde(default = "default_max_contexts")]
    #[validate(range(min = 1, max = 100000))]
    pub max_contexts: usize,
    /// Background sweep interval in seconds, 0 disables the sweep
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Per-context caps
    #[serde(default)]
    pub limits: ResourceLimits,
}

fn default_max_contexts() -> usize {
    100
}

fn default_cleanup_interval_secs() -> u64 {
    15 * 60
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_contexts: default_max_contexts(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            limits: ResourceLimits::default(),
        }
    }
}

impl RegistryConfig {
    /// Config with the background sweep disabled.
    pub fn manual(max_contexts: usize) -> Self {
        Self {
            max_contexts,
            cleanup_interval_secs: 0,
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sweep interval, `None` when disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}
