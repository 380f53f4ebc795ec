//! Unified error types for the context store.
//!
//! Only two kinds of failure reach callers:
//! - invalid arguments to a mutation (missing context or note)
//! - a rejected limits policy (non-positive or oversized cap)
//!
//! Cleanup and eviction never fail; they report what they removed instead.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Limit fields that a policy can be rejected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitField {
    MaxRecentRequests,
    MaxForms,
    MaxResources,
    MaxAge,
    MaxUrlPatterns,
    MaxNotesPerUrl,
}

impl LimitField {
    /// Name used in error messages and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxRecentRequests => "MaxRecentRequests",
            Self::MaxForms => "MaxForms",
            Self::MaxResources => "MaxResources",
            Self::MaxAge => "MaxAge",
            Self::MaxUrlPatterns => "MaxURLPatterns",
            Self::MaxNotesPerUrl => "MaxNotesPerURL",
        }
    }
}

impl std::fmt::Display for LimitField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unified error type for the context store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The proposed limits were refused; the active policy is unchanged.
    #[error("{message}")]
    PolicyRejected {
        field: LimitField,
        message: String,
    },
}

impl Error {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// A cap that is zero or negative.
    pub fn not_positive(field: LimitField) -> Self {
        Self::PolicyRejected {
            field,
            message: format!("{} must be positive", field),
        }
    }

    /// A cap above its sanity ceiling.
    pub fn too_large(field: LimitField, ceiling: i64) -> Self {
        Self::PolicyRejected {
            field,
            message: format!("{} too large (> {})", field, ceiling),
        }
    }

    /// Field named by a policy rejection, if this is one.
    pub fn rejected_field(&self) -> Option<LimitField> {
        match self {
            Self::PolicyRejected { field, .. } => Some(*field),
            _ => None,
        }
    }
}
