//! Observation types accumulated per host.
//!
//! These are plain values: a context owns them behind its lock and hands out
//! clones. They serialize with snake_case keys for prompt embedding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of the hex prefix used for form identifiers.
const FORM_ID_LEN: usize = 16;

/// Length of generated request identifiers.
const REQUEST_ID_LEN: usize = 8;

/// A URL pattern with the notes collected about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlPattern {
    pub pattern: String,
    pub method: String,
    /// What the endpoint appears to do (e.g. "User profile viewing")
    #[serde(default)]
    pub purpose: String,
    /// Oldest first
    #[serde(default)]
    pub notes: Vec<UrlNote>,
}

impl UrlPattern {
    pub fn new(pattern: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            method: method.into(),
            purpose: String::new(),
            notes: Vec::new(),
        }
    }

    /// Builds a pattern from a `METHOD:/path` key.
    pub fn from_key(key: &str) -> Self {
        let method = key
            .split_once(':')
            .map(|(method, _)| method)
            .unwrap_or_default();
        Self::new(key, method)
    }

    /// Composite map key: `METHOD:/path`.
    pub fn key(method: &str, url: &str) -> String {
        format!("{}:{}", method, url)
    }
}

/// A model-authored note about a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlNote {
    pub content: String,
    #[serde(default)]
    pub suspicious: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vuln_hint: Option<String>,
    /// 0.0 to 1.0
    pub confidence: f64,
}

impl UrlNote {
    /// Creates a note, clamping confidence into `[0, 1]`.
    pub fn new(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            content: content.into(),
            suspicious: false,
            vuln_hint: None,
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn suspicious(mut self, vuln_hint: impl Into<String>) -> Self {
        self.suspicious = true;
        self.vuln_hint = Some(vuln_hint.into());
        self
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Detected technology summary for a host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStack {
    pub technologies: Vec<Technology>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    /// Name with version (e.g. "React 18.2")
    pub name: String,
    pub reason: String,
    pub confidence: f64,
}

/// Lightweight, immutable request snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedRequest {
    pub id: String,
    /// Unix seconds
    pub timestamp: i64,
    pub method: String,
    /// Normalized path
    pub path: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Response duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl TimedRequest {
    /// Creates a snapshot with a fresh short id.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        status_code: u16,
        timestamp: i64,
    ) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(REQUEST_ID_LEN);

        Self {
            id,
            timestamp,
            method: method.into(),
            path: path.into(),
            status_code,
            referer: None,
            session_id: None,
            duration_ms: None,
        }
    }
}

/// Security-relevant form extracted from a response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlForm {
    /// Derived from action + method, see [`HtmlForm::derive_id`]
    pub form_id: String,
    pub action: String,
    pub method: String,
    pub has_csrf_token: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token_name: Option<String>,
    #[serde(default)]
    pub fields: Vec<FormField>,
    /// Unix seconds
    pub first_seen: i64,
}

impl HtmlForm {
    pub fn new(action: impl Into<String>, method: &str, first_seen: i64) -> Self {
        let action = action.into();
        let method = method.to_uppercase();
        Self {
            form_id: Self::derive_id(&action, &method),
            action,
            method,
            has_csrf_token: false,
            csrf_token_name: None,
            fields: Vec::new(),
            first_seen,
        }
    }

    /// First 16 hex chars of SHA-256 over `action|METHOD`.
    ///
    /// Re-extracting the same form yields the same id, so it overwrites
    /// instead of accumulating.
    pub fn derive_id(action: &str, method: &str) -> String {
        let digest = Sha256::digest(format!("{}|{}", action, method.to_uppercase()));
        let mut id = format!("{:x}", digest);
        id.truncate(FORM_ID_LEN);
        id
    }

    pub fn with_field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_csrf_token(mut self, name: impl Into<String>) -> Self {
        self.has_csrf_token = true;
        self.csrf_token_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    /// text, password, hidden, ...
    #[serde(rename = "type")]
    pub field_type: String,
    pub sensitive: bool,
}

impl FormField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>, sensitive: bool) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            sensitive,
        }
    }
}

/// CRUD operation implied by an HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrudOperation {
    Read,
    Create,
    Update,
    Delete,
}

impl CrudOperation {
    pub fn from_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Read),
            "POST" => Some(Self::Create),
            "PUT" | "PATCH" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// CRUD operations observed for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMapping {
    /// e.g. "/api/users"
    pub resource_path: String,
    /// HTTP method -> operation
    #[serde(default)]
    pub operations: BTreeMap<String, CrudOperation>,
    /// Concrete paths that contributed, deduplicated
    #[serde(default)]
    pub related_paths: Vec<String>,
    /// Unix seconds
    pub detected_at: i64,
}

impl ResourceMapping {
    pub fn new(resource_path: impl Into<String>, detected_at: i64) -> Self {
        Self {
            resource_path: resource_path.into(),
            operations: BTreeMap::new(),
            related_paths: Vec::new(),
            detected_at,
        }
    }

    /// Records `method` on `path`. The first path seen for a method is kept as
    /// related; methods without a CRUD meaning are ignored.
    ///
    /// Returns true if a new operation was added.
    pub fn record(&mut self, method: &str, path: &str) -> bool {
        let Some(operation) = CrudOperation::from_method(method) else {
            return false;
        };

        let method = method.to_ascii_uppercase();
        if self.operations.contains_key(&method) {
            return false;
        }
        self.operations.insert(method, operation);
        if !self.related_paths.iter().any(|p| p == path) {
            self.related_paths.push(path.to_string());
        }
        true
    }

    /// GET, POST, PUT and DELETE all observed. PATCH stands in for PUT.
    pub fn has_full_crud(&self) -> bool {
        ["GET", "POST", "PUT", "DELETE"].iter().all(|method| {
            self.operations.contains_key(*method)
                || (*method == "PUT" && self.operations.contains_key("PATCH"))
        })
    }
}
