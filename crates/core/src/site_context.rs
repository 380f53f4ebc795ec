//! Per-host context: bounded, lock-guarded collections for one target.
//!
//! Every mutator takes the write lock for its whole duration and every
//! accessor takes the read lock. All size and age decisions are delegated to
//! the shared [`ResourceLimiter`]; the policy is read once per call so a
//! concurrent limits update never splits a single mutation.
//!
//! Eviction picks the oldest item by a linear scan. Collections are capped
//! by configuration, so the scan length is bounded by the caps, not by
//! traffic volume.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::limits::{ResourceLimiter, ResourceLimits};
use crate::models::{HtmlForm, ResourceMapping, TechStack, TimedRequest, UrlNote, UrlPattern};

/// Everything learned about one host.
#[derive(Debug)]
pub struct SiteContext {
    host: String,
    limiter: Arc<ResourceLimiter>,
    state: RwLock<ContextState>,
}

#[derive(Debug, Default)]
struct ContextState {
    url_patterns: HashMap<String, UrlPattern>,
    tech_stack: Option<TechStack>,
    /// Oldest first
    recent_requests: Vec<TimedRequest>,
    forms: HashMap<String, HtmlForm>,
    resource_crud: HashMap<String, ResourceMapping>,
    /// Lifetime count of accepted requests
    request_count: u64,
    last_activity: i64,
    last_cleanup: i64,
}

/// Scalar snapshot of a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextStats {
    pub host: String,
    pub url_patterns: usize,
    pub recent_requests: usize,
    pub forms: usize,
    pub resources: usize,
    pub request_count: u64,
    pub last_activity: i64,
    pub last_cleanup: i64,
    pub memory_estimate: u64,
}

/// Read-only copy of a context's collections for prompt construction.
#[derive(Debug, Clone, Serialize)]
pub struct SiteSnapshot {
    pub host: String,
    pub url_patterns: HashMap<String, UrlPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<TechStack>,
    pub recent_requests: Vec<TimedRequest>,
    pub forms: HashMap<String, HtmlForm>,
    pub resource_crud: HashMap<String, ResourceMapping>,
    pub request_count: u64,
    pub last_activity: i64,
}

/// Items removed by one cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub requests: usize,
    pub forms: usize,
    pub resources: usize,
    pub url_patterns: usize,
    pub notes: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.requests + self.forms + self.resources + self.url_patterns + self.notes
    }
}

impl std::ops::AddAssign for CleanupReport {
    fn add_assign(&mut self, other: Self) {
        self.requests += other.requests;
        self.forms += other.forms;
        self.resources += other.resources;
        self.url_patterns += other.url_patterns;
        self.notes += other.notes;
    }
}

impl ContextState {
    /// Never moves `last_activity` backwards.
    fn touch(&mut self, now: i64) {
        self.last_activity = self.last_activity.max(now);
    }
}

impl SiteContext {
    /// Creates an empty context. Creation counts as activity.
    pub fn new(host: impl Into<String>, limiter: Arc<ResourceLimiter>) -> Self {
        let now = limiter.now();
        Self {
            host: host.into(),
            limiter,
            state: RwLock::new(ContextState {
                last_activity: now,
                last_cleanup: now,
                ..ContextState::default()
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn limiter(&self) -> &Arc<ResourceLimiter> {
        &self.limiter
    }

    /// Appends a request unless it is already stale.
    ///
    /// Returns false for stale requests, which leave the history and the
    /// lifetime counter untouched.
    pub fn add_recent_request(&self, request: TimedRequest) -> bool {
        let mut state = self.state.write();

        if self.limiter.should_cleanup(request.timestamp) {
            debug!(host = %self.host, request_id = %request.id, "Dropping stale request");
            return false;
        }

        let cap = self.limiter.limits().recent_requests_cap();
        state.recent_requests.push(request);
        truncate_head(&mut state.recent_requests, cap);

        state.request_count += 1;
        state.touch(self.limiter.now());
        true
    }

    /// Inserts or overwrites a form by id, evicting the oldest form when a new
    /// id would exceed the cap.
    pub fn add_form(&self, form: HtmlForm) {
        let mut state = self.state.write();
        let cap = self.limiter.limits().forms_cap();

        if !state.forms.contains_key(&form.form_id) {
            while !state.forms.is_empty() && state.forms.len() >= cap {
                evict_oldest(&mut state.forms, |f| f.first_seen);
            }
        }
        state.forms.insert(form.form_id.clone(), form);
        state.touch(self.limiter.now());
    }

    /// Inserts or overwrites a resource mapping, evicting the oldest by
    /// `detected_at` when a new key would exceed the cap.
    pub fn add_resource_mapping(&self, key: impl Into<String>, mapping: ResourceMapping) {
        let key = key.into();
        let mut state = self.state.write();
        let cap = self.limiter.limits().resources_cap();

        if !state.resource_crud.contains_key(&key) {
            make_room(&mut state.resource_crud, cap);
        }
        state.resource_crud.insert(key, mapping);
        state.touch(self.limiter.now());
    }

    /// Records `method` on `path` under `resource`, creating the mapping if
    /// needed.
    ///
    /// Returns true if a new operation was learned.
    pub fn record_crud_operation(&self, resource: &str, method: &str, path: &str) -> bool {
        let mut state = self.state.write();
        let now = self.limiter.now();
        let cap = self.limiter.limits().resources_cap();

        if !state.resource_crud.contains_key(resource) {
            make_room(&mut state.resource_crud, cap);
        }
        let added = state
            .resource_crud
            .entry(resource.to_string())
            .or_insert_with(|| ResourceMapping::new(resource, now))
            .record(method, path);

        state.touch(now);
        added
    }

    /// Adds `note` to the pattern at `key`.
    ///
    /// For an existing key the note is appended (oldest notes dropped past the
    /// cap). For a new key `pattern` is inserted as given, or built from the
    /// key and seeded with the note when `None`. A non-empty note content
    /// becomes the pattern's purpose either way.
    pub fn update_url_pattern(
        &self,
        key: &str,
        pattern: Option<UrlPattern>,
        note: Option<UrlNote>,
    ) -> Result<()> {
        let note = note.ok_or_else(|| Error::invalid_argument("urlNote cannot be nil"))?;

        let mut state = self.state.write();
        let limits = self.limiter.limits();
        let notes_cap = limits.notes_per_url_cap();

        if !state.url_patterns.contains_key(key) {
            while !state.url_patterns.is_empty()
                && state.url_patterns.len() >= limits.url_patterns_cap()
            {
                evict_least_annotated(&mut state.url_patterns);
            }

            let pattern = pattern.unwrap_or_else(|| {
                let mut seeded = UrlPattern::from_key(key);
                seeded.notes.push(note.clone());
                seeded
            });
            state.url_patterns.insert(key.to_string(), pattern);
        } else if let Some(existing) = state.url_patterns.get_mut(key) {
            existing.notes.push(note.clone());
        }

        if let Some(entry) = state.url_patterns.get_mut(key) {
            truncate_head(&mut entry.notes, notes_cap);
            if !note.content.is_empty() {
                entry.purpose = note.content;
            }
        }

        state.touch(self.limiter.now());
        Ok(())
    }

    /// Replaces the detected technology summary.
    pub fn set_tech_stack(&self, tech_stack: TechStack) {
        let mut state = self.state.write();
        state.tech_stack = Some(tech_stack);
        state.touch(self.limiter.now());
    }

    /// Drops stale requests, forms and resources, then re-applies every cap.
    pub fn cleanup_old_data(&self) -> CleanupReport {
        let mut state = self.state.write();
        let limits = self.limiter.limits();
        let limiter = &self.limiter;
        let mut report = CleanupReport::default();

        let before = state.recent_requests.len();
        state.recent_requests.retain(|r| !limiter.should_cleanup(r.timestamp));
        report.requests = before - state.recent_requests.len();

        let before = state.forms.len();
        state.forms.retain(|_, f| !limiter.should_cleanup(f.first_seen));
        report.forms = before - state.forms.len();

        let before = state.resource_crud.len();
        state.resource_crud.retain(|_, r| !limiter.should_cleanup(r.detected_at));
        report.resources = before - state.resource_crud.len();

        report += enforce_caps(&mut state, &limits);

        state.last_cleanup = limiter.now();

        if report.total() > 0 {
            debug!(
                host = %self.host,
                requests = report.requests,
                forms = report.forms,
                resources = report.resources,
                url_patterns = report.url_patterns,
                notes = report.notes,
                "Context cleanup removed items"
            );
        }
        report
    }

    pub fn stats(&self) -> ContextStats {
        let state = self.state.read();
        ContextStats {
            host: self.host.clone(),
            url_patterns: state.url_patterns.len(),
            recent_requests: state.recent_requests.len(),
            forms: state.forms.len(),
            resources: state.resource_crud.len(),
            request_count: state.request_count,
            last_activity: state.last_activity,
            last_cleanup: state.last_cleanup,
            memory_estimate: self.limiter.memory_usage(),
        }
    }

    /// Copies every collection under one read lock.
    pub fn snapshot(&self) -> SiteSnapshot {
        let state = self.state.read();
        SiteSnapshot {
            host: self.host.clone(),
            url_patterns: state.url_patterns.clone(),
            tech_stack: state.tech_stack.clone(),
            recent_requests: state.recent_requests.clone(),
            forms: state.forms.clone(),
            resource_crud: state.resource_crud.clone(),
            request_count: state.request_count,
            last_activity: state.last_activity,
        }
    }

    pub fn last_activity(&self) -> i64 {
        self.state.read().last_activity
    }

    pub fn request_count(&self) -> u64 {
        self.state.read().request_count
    }

    pub fn recent_requests(&self) -> Vec<TimedRequest> {
        self.state.read().recent_requests.clone()
    }

    pub fn url_pattern(&self, key: &str) -> Option<UrlPattern> {
        self.state.read().url_patterns.get(key).cloned()
    }

    pub fn form(&self, form_id: &str) -> Option<HtmlForm> {
        self.state.read().forms.get(form_id).cloned()
    }

    pub fn resource_mapping(&self, key: &str) -> Option<ResourceMapping> {
        self.state.read().resource_crud.get(key).cloned()
    }

    pub fn tech_stack(&self) -> Option<TechStack> {
        self.state.read().tech_stack.clone()
    }
}

/// Keeps the newest `cap` items.
fn truncate_head<T>(items: &mut Vec<T>, cap: usize) -> usize {
    let excess = items.len().saturating_sub(cap);
    if excess > 0 {
        items.drain(..excess);
    }
    excess
}

/// Removes the entry with the smallest timestamp. Ties are arbitrary.
fn evict_oldest<V>(map: &mut HashMap<String, V>, timestamp: impl Fn(&V) -> i64) -> bool {
    let oldest = map
        .iter()
        .min_by_key(|(_, v)| timestamp(v))
        .map(|(k, _)| k.clone());

    match oldest {
        Some(key) => map.remove(&key).is_some(),
        None => false,
    }
}

fn make_room(resources: &mut HashMap<String, ResourceMapping>, cap: usize) {
    while !resources.is_empty() && resources.len() >= cap {
        evict_oldest(resources, |r| r.detected_at);
    }
}

/// Removes a pattern with the fewest notes, which is any never-annotated
/// pattern when one exists. Ties are arbitrary.
fn evict_least_annotated(patterns: &mut HashMap<String, UrlPattern>) -> bool {
    let victim = patterns
        .iter()
        .min_by_key(|(_, p)| p.notes.len())
        .map(|(k, _)| k.clone());

    match victim {
        Some(key) => patterns.remove(&key).is_some(),
        None => false,
    }
}

fn enforce_caps(state: &mut ContextState, limits: &ResourceLimits) -> CleanupReport {
    let mut report = CleanupReport::default();

    report.requests += truncate_head(&mut state.recent_requests, limits.recent_requests_cap());

    while state.forms.len() > limits.forms_cap() && evict_oldest(&mut state.forms, |f| f.first_seen) {
        report.forms += 1;
    }

    while state.resource_crud.len() > limits.resources_cap()
        && evict_oldest(&mut state.resource_crud, |r| r.detected_at)
    {
        report.resources += 1;
    }

    while state.url_patterns.len() > limits.url_patterns_cap()
        && evict_least_annotated(&mut state.url_patterns)
    {
        report.url_patterns += 1;
    }

    let notes_cap = limits.notes_per_url_cap();
    for pattern in state.url_patterns.values_mut() {
        report.notes += truncate_head(&mut pattern.notes, notes_cap);
    }

    report
}
