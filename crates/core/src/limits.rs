//! Memory and age limits for per-host contexts.
//!
//! MEMORY SAFETY: every collection inside a context is capped by one of these
//! limits, so total memory is bounded by `max_contexts × memory_usage()`
//! no matter how much traffic a host produces.
//!
//! # Design Rationale
//!
//! With the defaults (50 requests, 20 forms, 30 resources, 100 patterns
//! × 100 notes) a single context estimates to roughly 1.6MB, dominated by
//! notes. 100 contexts stay well below 200MB.
//!
//! The limiter is shared by every context a registry creates. Updates swap
//! the whole `ResourceLimits` value under a write lock, so readers always see
//! one complete policy.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, LimitField, Result};

// === Defaults ===

/// Default recent request history per host.
pub const DEFAULT_MAX_RECENT_REQUESTS: i64 = 50;

/// Default extracted forms per host.
pub const DEFAULT_MAX_FORMS: i64 = 20;

/// Default CRUD resource mappings per host.
pub const DEFAULT_MAX_RESOURCES: i64 = 30;

/// Default URL patterns per host.
pub const DEFAULT_MAX_URL_PATTERNS: i64 = 100;

/// Default notes kept per URL pattern.
pub const DEFAULT_MAX_NOTES_PER_URL: i64 = 100;

/// Default maximum age of any item (24 hours).
pub const DEFAULT_MAX_AGE_SECS: i64 = 24 * 60 * 60;

// === Sanity Ceilings ===

pub const CEILING_RECENT_REQUESTS: i64 = 1000;
pub const CEILING_FORMS: i64 = 500;
pub const CEILING_RESOURCES: i64 = 500;
pub const CEILING_URL_PATTERNS: i64 = 1000;
pub const CEILING_NOTES_PER_URL: i64 = 1000;

/// 30 days.
pub const CEILING_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

// === Per-item Byte Weights ===

const BASE_BYTES: u64 = 1024;
const REQUEST_BYTES: u64 = 200;
const FORM_BYTES: u64 = 500;
const RESOURCE_BYTES: u64 = 300;
const URL_PATTERN_BYTES: u64 = 400;
const NOTE_BYTES: u64 = 150;

/// Numeric caps for one context.
///
/// Signed so that operator input like `-1` survives deserialization and is
/// rejected with a field-specific message instead of a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default = "default_max_recent_requests")]
    pub max_recent_requests: i64,
    #[serde(default = "default_max_forms")]
    pub max_forms: i64,
    #[serde(default = "default_max_resources")]
    pub max_resources: i64,
    #[serde(default = "default_max_url_patterns")]
    pub max_url_patterns: i64,
    #[serde(default = "default_max_notes_per_url")]
    pub max_notes_per_url: i64,
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: i64,
}

fn default_max_recent_requests() -> i64 {
    DEFAULT_MAX_RECENT_REQUESTS
}

fn default_max_forms() -> i64 {
    DEFAULT_MAX_FORMS
}

fn default_max_resources() -> i64 {
    DEFAULT_MAX_RESOURCES
}

fn default_max_url_patterns() -> i64 {
    DEFAULT_MAX_URL_PATTERNS
}

fn default_max_notes_per_url() -> i64 {
    DEFAULT_MAX_NOTES_PER_URL
}

fn default_max_age_secs() -> i64 {
    DEFAULT_MAX_AGE_SECS
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_recent_requests: DEFAULT_MAX_RECENT_REQUESTS,
            max_forms: DEFAULT_MAX_FORMS,
            max_resources: DEFAULT_MAX_RESOURCES,
            max_url_patterns: DEFAULT_MAX_URL_PATTERNS,
            max_notes_per_url: DEFAULT_MAX_NOTES_PER_URL,
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl ResourceLimits {
    fn fields(&self) -> [(LimitField, i64, i64); 6] {
        [
            (LimitField::MaxRecentRequests, self.max_recent_requests, CEILING_RECENT_REQUESTS),
            (LimitField::MaxForms, self.max_forms, CEILING_FORMS),
            (LimitField::MaxResources, self.max_resources, CEILING_RESOURCES),
            (LimitField::MaxAge, self.max_age_secs, CEILING_MAX_AGE_SECS),
            (LimitField::MaxUrlPatterns, self.max_url_patterns, CEILING_URL_PATTERNS),
            (LimitField::MaxNotesPerUrl, self.max_notes_per_url, CEILING_NOTES_PER_URL),
        ]
    }

    /// Rejects the first field that is zero or negative.
    pub fn check_positive(&self) -> Result<()> {
        for (field, value, _) in self.fields() {
            if value <= 0 {
                return Err(Error::not_positive(field));
            }
        }
        Ok(())
    }

    /// Rejects the first field above its sanity ceiling.
    pub fn check_ceilings(&self) -> Result<()> {
        for (field, value, ceiling) in self.fields() {
            if value > ceiling {
                return Err(Error::too_large(field, ceiling));
            }
        }
        Ok(())
    }

    pub fn recent_requests_cap(&self) -> usize {
        as_cap(self.max_recent_requests)
    }

    pub fn forms_cap(&self) -> usize {
        as_cap(self.max_forms)
    }

    pub fn resources_cap(&self) -> usize {
        as_cap(self.max_resources)
    }

    pub fn url_patterns_cap(&self) -> usize {
        as_cap(self.max_url_patterns)
    }

    pub fn notes_per_url_cap(&self) -> usize {
        as_cap(self.max_notes_per_url)
    }

    /// Estimated bytes for one fully populated context. Saturates at
    /// `u64::MAX` for caps past the sanity ceilings.
    pub fn memory_estimate(&self) -> u64 {
        let requests = as_cap(self.max_recent_requests) as u64;
        let forms = as_cap(self.max_forms) as u64;
        let resources = as_cap(self.max_resources) as u64;
        let patterns = as_cap(self.max_url_patterns) as u64;
        let notes = as_cap(self.max_notes_per_url) as u64;

        [
            requests.saturating_mul(REQUEST_BYTES),
            forms.saturating_mul(FORM_BYTES),
            resources.saturating_mul(RESOURCE_BYTES),
            patterns.saturating_mul(URL_PATTERN_BYTES),
            patterns.saturating_mul(notes).saturating_mul(NOTE_BYTES),
        ]
        .into_iter()
        .fold(BASE_BYTES, u64::saturating_add)
    }
}

fn as_cap(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

/// Shared, replaceable limits policy plus the staleness predicate.
#[derive(Debug)]
pub struct ResourceLimiter {
    limits: RwLock<ResourceLimits>,
    clock: Arc<dyn Clock>,
}

impl Default for ResourceLimiter {
    fn default() -> Self {
        Self {
            limits: RwLock::new(ResourceLimits::default()),
            clock: Arc::new(SystemClock),
        }
    }
}

impl ResourceLimiter {
    /// Creates a limiter on the system clock. Every cap must be positive.
    pub fn new(limits: ResourceLimits) -> Result<Self> {
        Self::with_clock(limits, Arc::new(SystemClock))
    }

    pub fn with_clock(limits: ResourceLimits, clock: Arc<dyn Clock>) -> Result<Self> {
        limits.check_positive()?;
        Ok(Self {
            limits: RwLock::new(limits),
            clock,
        })
    }

    /// Snapshot of the active policy.
    pub fn limits(&self) -> ResourceLimits {
        *self.limits.read()
    }

    /// Replaces the policy. On error the previous policy stays in force.
    pub fn update_limits(&self, limits: ResourceLimits) -> Result<()> {
        limits.check_positive()?;
        *self.limits.write() = limits;
        Ok(())
    }

    /// Checks the active policy against the sanity ceilings.
    pub fn validate_limits(&self) -> Result<()> {
        self.limits().check_ceilings()
    }

    /// True iff `timestamp` is older than `now - max_age`.
    pub fn should_cleanup(&self, timestamp: i64) -> bool {
        let max_age = self.limits.read().max_age_secs;
        timestamp < self.clock.now().saturating_sub(max_age)
    }

    /// Estimated bytes per context, derived from the caps alone.
    pub fn memory_usage(&self) -> u64 {
        self.limits().memory_estimate()
    }

    /// Current time on the limiter's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }
}
