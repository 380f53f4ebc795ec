//! Concurrent mutation of a shared context and registry.

use std::sync::Arc;
use std::thread;

use context_core::{ResourceLimits, UrlPattern};
use integration_tests::{fixtures, setup::TestContext};

const WORKERS: usize = 100;
const OPS_PER_WORKER: usize = 5;

#[test]
fn test_concurrent_writers_respect_bounds() {
    let ctx = TestContext::new(10);
    let context = ctx.registry.get_or_create("example.com");
    let limits = ctx.registry.limits();
    let now = ctx.now();

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let context = &context;
            let registry = &ctx.registry;
            s.spawn(move || {
                for op in 0..OPS_PER_WORKER {
                    let path = format!("/api/w{}/{}", worker, op);

                    context.add_recent_request(fixtures::request_at("GET", &path, now));
                    context.add_form(fixtures::login_form(&path, now));
                    registry
                        .update_url_pattern(
                            Some(context),
                            &path,
                            "POST",
                            Some(fixtures::note("worker note")),
                        )
                        .unwrap();
                }
            });
        }
    });

    let stats = context.stats();
    assert_eq!(stats.request_count, (WORKERS * OPS_PER_WORKER) as u64);
    assert_eq!(stats.recent_requests, limits.recent_requests_cap());
    assert_eq!(stats.forms, limits.forms_cap());
    assert_eq!(stats.url_patterns, limits.url_patterns_cap());
}

#[test]
fn test_concurrent_notes_on_one_pattern() {
    let ctx = TestContext::new(10);
    let context = ctx.registry.get_or_create("example.com");
    let key = UrlPattern::key("GET", "/api/search");

    thread::scope(|s| {
        for _ in 0..WORKERS {
            let context = &context;
            let key = &key;
            s.spawn(move || {
                for _ in 0..OPS_PER_WORKER {
                    context
                        .update_url_pattern(key, None, Some(fixtures::note("reflects q")))
                        .unwrap();
                }
            });
        }
    });

    let pattern = context.url_pattern(&key).unwrap();
    assert_eq!(pattern.notes.len(), ctx.registry.limits().notes_per_url_cap());
    assert_eq!(pattern.purpose, "reflects q");
}

#[test]
fn test_concurrent_hosts_stay_under_capacity() {
    let ctx = TestContext::new(20);
    let registry = Arc::clone(&ctx.registry);

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let registry = &registry;
            s.spawn(move || {
                for op in 0..OPS_PER_WORKER {
                    let host = format!("host{}-{}.example.com", worker, op);
                    let context = registry.get_or_create(&host);
                    context.add_recent_request(fixtures::request("GET", "/"));
                    assert!(registry.len() <= 20);
                }
            });
        }
    });

    assert_eq!(registry.len(), 20);
}

#[test]
fn test_limit_updates_race_with_writers() {
    let ctx = TestContext::new(10);
    let context = ctx.registry.get_or_create("example.com");
    let now = ctx.now();

    thread::scope(|s| {
        for worker in 0..WORKERS {
            let context = &context;
            let registry = &ctx.registry;
            s.spawn(move || {
                if worker % 10 == 0 {
                    let max_recent_requests = 5 + (worker / 10) as i64;
                    registry
                        .update_limits(ResourceLimits {
                            max_recent_requests,
                            ..ResourceLimits::default()
                        })
                        .unwrap();
                } else {
                    for _ in 0..OPS_PER_WORKER {
                        context.add_recent_request(fixtures::request_at("GET", "/", now));
                    }
                }
            });
        }
    });

    // Whichever policy won, one more write brings the history under it
    context.add_recent_request(fixtures::request_at("GET", "/", now));
    assert!(context.stats().recent_requests <= ctx.registry.limits().recent_requests_cap());
}
