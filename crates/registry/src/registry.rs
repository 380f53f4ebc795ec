//! Host-to-context registry.
//!
//! One registry per process, constructed explicitly and handed to workers
//! as `Arc<ContextRegistry>`. The host map has its own lock; each context
//! has another. The registry may call into contexts while holding its lock,
//! but contexts never call back, so the two scopes cannot deadlock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use context_core::{
    CleanupReport, Clock, Error, ResourceLimiter, ResourceLimits, Result, SiteContext,
    SystemClock, UrlNote, UrlPattern,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::scheduler::CleanupScheduler;

/// Aggregate statistics across all live contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_contexts: usize,
    pub max_contexts: usize,
    pub total_memory_bytes: u64,
    pub total_requests: u64,
    pub total_url_patterns: usize,
    pub total_forms: usize,
    pub total_resources: usize,
    pub last_global_cleanup: i64,
}

/// Outcome of one registry-wide sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub contexts_cleaned: usize,
    pub contexts_evicted: usize,
    pub contexts_remaining: usize,
    pub items_removed: usize,
}

/// Registry of per-host contexts.
pub struct ContextRegistry {
    contexts: RwLock<HashMap<String, Arc<SiteContext>>>,
    limiter: Arc<ResourceLimiter>,
    max_contexts: usize,
    last_global_cleanup: AtomicI64,
    scheduler: Mutex<Option<CleanupScheduler>>,
    stopped: AtomicBool,
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("contexts", &self.len())
            .field("max_contexts", &self.max_contexts)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl ContextRegistry {
    /// Creates a registry on the system clock.
    ///
    /// The background sweep starts here when the config enables it and a
    /// Tokio runtime is available.
    pub fn new(config: &RegistryConfig) -> Result<Arc<Self>> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &RegistryConfig, clock: Arc<dyn Clock>) -> Result<Arc<Self>> {
        let limiter = Arc::new(ResourceLimiter::with_clock(config.limits, clock)?);
        Ok(Self::with_limiter(
            config.max_contexts,
            limiter,
            config.cleanup_interval(),
        ))
    }

    /// Creates a registry sharing `limiter` with every context it creates.
    pub fn with_limiter(
        max_contexts: usize,
        limiter: Arc<ResourceLimiter>,
        cleanup_interval: Option<Duration>,
    ) -> Arc<Self> {
        let registry = Arc::new(Self {
            contexts: RwLock::new(HashMap::new()),
            last_global_cleanup: AtomicI64::new(limiter.now()),
            limiter,
            max_contexts: max_contexts.max(1),
            scheduler: Mutex::new(None),
            stopped: AtomicBool::new(false),
        });

        if let Some(interval) = cleanup_interval {
            let scheduler = CleanupScheduler::start(Arc::downgrade(&registry), interval);
            *registry.scheduler.lock() = scheduler;
        }

        registry
    }

    /// Returns the context for `host`, creating it on first use.
    ///
    /// At capacity, the least recently active context is evicted first.
    pub fn get_or_create(&self, host: &str) -> Arc<SiteContext> {
        let mut contexts = self.contexts.write();

        if let Some(context) = contexts.get(host) {
            return context.clone();
        }

        while contexts.len() >= self.max_contexts {
            match evict_oldest(&mut contexts) {
                Some(evicted) => {
                    metrics().capacity_evictions.inc();
                    info!(host = %evicted, "Evicted oldest context");
                }
                None => break,
            }
        }

        let context = Arc::new(SiteContext::new(host, self.limiter.clone()));
        contexts.insert(host.to_string(), context.clone());

        metrics().contexts_created.inc();
        metrics().live_contexts.set(contexts.len() as u64);
        debug!(host = %host, total = contexts.len(), "Created context");

        context
    }

    /// Looks up `host` without creating it.
    pub fn get(&self, host: &str) -> Option<Arc<SiteContext>> {
        self.contexts.read().get(host).cloned()
    }

    /// Cleans and removes the context for `host`. Returns false if absent.
    pub fn remove_context(&self, host: &str) -> bool {
        let mut contexts = self.contexts.write();

        let Some(context) = contexts.get(host) else {
            return false;
        };
        let report = context.cleanup_old_data();
        contexts.remove(host);

        metrics().contexts_removed.inc();
        metrics().live_contexts.set(contexts.len() as u64);
        info!(host = %host, items_cleaned = report.total(), "Removed context");
        true
    }

    /// Annotates the `METHOD:url` pattern of `context` with `note`.
    pub fn update_url_pattern(
        &self,
        context: Option<&SiteContext>,
        url: &str,
        method: &str,
        note: Option<UrlNote>,
    ) -> Result<()> {
        let context = context.ok_or_else(|| Error::invalid_argument("siteContext cannot be nil"))?;
        let note = note.ok_or_else(|| Error::invalid_argument("urlNote cannot be nil"))?;

        let mut pattern = UrlPattern::new(url, method);
        if !note.content.is_empty() {
            pattern.purpose = note.content.clone();
        }
        pattern.notes.push(note.clone());

        context.update_url_pattern(&UrlPattern::key(method, url), Some(pattern), Some(note))
    }

    /// Cleans every context and evicts the ones whose last activity is stale.
    ///
    /// Holds the exclusive lock for the whole sweep, so lookups never observe
    /// a half-evicted host.
    pub fn perform_global_cleanup(&self) -> SweepSummary {
        let started = Instant::now();
        let mut summary = SweepSummary::default();
        let mut removed = CleanupReport::default();

        let mut contexts = self.contexts.write();

        contexts.retain(|host, context| {
            removed += context.cleanup_old_data();
            summary.contexts_cleaned += 1;

            if self.limiter.should_cleanup(context.last_activity()) {
                info!(host = %host, "Evicted inactive context");
                summary.contexts_evicted += 1;
                metrics().stale_evictions.inc();
                false
            } else {
                true
            }
        });

        while contexts.len() > self.max_contexts {
            match evict_oldest(&mut contexts) {
                Some(evicted) => {
                    info!(host = %evicted, "Evicted oldest context over capacity");
                    summary.contexts_evicted += 1;
                    metrics().capacity_evictions.inc();
                }
                None => break,
            }
        }

        summary.contexts_remaining = contexts.len();
        summary.items_removed = removed.total();
        drop(contexts);

        self.last_global_cleanup.store(self.limiter.now(), Ordering::Relaxed);

        let m = metrics();
        m.cleanup_sweeps.inc();
        m.items_cleaned.inc_by(summary.items_removed as u64);
        m.live_contexts.set(summary.contexts_remaining as u64);
        m.sweep_latency_ms.observe(started.elapsed().as_millis() as u64);

        if summary.contexts_cleaned > 0 || summary.contexts_evicted > 0 {
            info!(
                cleaned = summary.contexts_cleaned,
                evicted = summary.contexts_evicted,
                remaining = summary.contexts_remaining,
                items_removed = summary.items_removed,
                "Global cleanup completed"
            );
        }

        summary
    }

    /// Replaces the shared limits. Existing contexts shrink on their next
    /// mutation or cleanup pass.
    pub fn update_limits(&self, limits: ResourceLimits) -> Result<()> {
        // Sweeps hold this lock, so a sweep never straddles two policies.
        let contexts = self.contexts.write();

        if let Err(e) = self.limiter.update_limits(limits) {
            metrics().limit_rejections.inc();
            warn!(error = %e, "Rejected limits update");
            return Err(e);
        }

        metrics().limit_updates.inc();
        info!(contexts = contexts.len(), ?limits, "Updated context limits");
        Ok(())
    }

    /// Checks the active limits against their sanity ceilings.
    pub fn validate_limits(&self) -> Result<()> {
        self.limiter.validate_limits()
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limiter.limits()
    }

    pub fn limiter(&self) -> &Arc<ResourceLimiter> {
        &self.limiter
    }

    pub fn max_contexts(&self) -> usize {
        self.max_contexts
    }

    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let contexts = self.contexts.read();

        let mut stats = RegistryStats {
            total_contexts: contexts.len(),
            max_contexts: self.max_contexts,
            total_memory_bytes: 0,
            total_requests: 0,
            total_url_patterns: 0,
            total_forms: 0,
            total_resources: 0,
            last_global_cleanup: self.last_global_cleanup.load(Ordering::Relaxed),
        };

        for context in contexts.values() {
            let s = context.stats();
            stats.total_memory_bytes = stats.total_memory_bytes.saturating_add(s.memory_estimate);
            stats.total_requests += s.request_count;
            stats.total_url_patterns += s.url_patterns;
            stats.total_forms += s.forms;
            stats.total_resources += s.resources;
        }

        stats
    }

    pub fn all_hosts(&self) -> Vec<String> {
        self.contexts.read().keys().cloned().collect()
    }

    /// Stops the background sweep and runs a final cleanup on every context.
    ///
    /// Only the first call does anything. The final pass runs here rather than
    /// in the task, so a sweep already in flight may overlap it; both only
    /// drop stale or over-cap data, so the order does not matter. Use
    /// [`shutdown`](Self::shutdown) to also wait for the task to exit.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(scheduler) = self.scheduler.lock().as_ref() {
            scheduler.cancel();
        }

        let contexts = self.contexts.read();
        let mut removed = CleanupReport::default();
        for context in contexts.values() {
            removed += context.cleanup_old_data();
        }

        info!(
            contexts = contexts.len(),
            items_removed = removed.total(),
            "Context registry stopped"
        );
    }

    /// [`stop`](Self::stop), then waits for the background task to exit.
    pub async fn shutdown(&self) {
        self.stop();

        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.join().await;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.lock().is_some()
    }
}

impl Drop for ContextRegistry {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.get_mut().as_ref() {
            scheduler.cancel();
        }
    }
}

/// Removes the context with the smallest last activity. Ties are arbitrary.
fn evict_oldest(contexts: &mut HashMap<String, Arc<SiteContext>>) -> Option<String> {
    let oldest = contexts
        .iter()
        .min_by_key(|(_, context)| context.last_activity())
        .map(|(host, _)| host.clone())?;

    contexts.remove(&oldest);
    Some(oldest)
}
