//! Staleness, sweeps and shutdown.

use std::sync::Arc;
use std::time::Duration;

use context_core::{Clock, ManualClock, TechStack, Technology};
use context_registry::{ContextRegistry, RegistryConfig};
use integration_tests::{
    fixtures,
    setup::{TestContext, HOUR, START},
};

#[test]
fn test_stale_data_swept_and_fresh_kept() {
    let ctx = TestContext::new(10);
    let context = ctx.registry.get_or_create("example.com");

    context.add_recent_request(fixtures::request_at("GET", "/old", START));
    context.add_form(fixtures::login_form("/old-login", START));

    ctx.advance_hours(23);
    context.add_recent_request(fixtures::request_at("GET", "/new", ctx.now()));
    context.add_form(fixtures::login_form("/new-login", ctx.now()));

    ctx.advance_hours(2);
    let summary = ctx.registry.perform_global_cleanup();

    assert_eq!(summary.contexts_evicted, 0, "activity 2h ago keeps the host");
    assert_eq!(summary.items_removed, 2);
    let recent = context.recent_requests();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].path, "/new");
    assert_eq!(context.stats().forms, 1);
}

#[test]
fn test_stale_request_rejected_on_insert() {
    let ctx = TestContext::new(10);
    let context = ctx.registry.get_or_create("example.com");
    ctx.advance_hours(48);

    assert!(!context.add_recent_request(fixtures::request_at("GET", "/", START)));
    assert_eq!(context.request_count(), 0);
    assert!(context.recent_requests().is_empty());
}

#[test]
fn test_idle_hosts_evicted_by_sweep() {
    let ctx = TestContext::new(10);
    for n in 0..4 {
        ctx.registry.get_or_create(&format!("idle{}.com", n));
    }

    ctx.advance_hours(25);
    let busy = ctx.registry.get_or_create("busy.com");
    busy.set_tech_stack(TechStack {
        technologies: vec![Technology {
            name: "nginx".to_string(),
            reason: "Server header".to_string(),
            confidence: 0.95,
        }],
    });

    let summary = ctx.registry.perform_global_cleanup();
    assert_eq!(summary.contexts_evicted, 4);
    assert_eq!(ctx.registry.all_hosts(), vec!["busy.com"]);
    assert_eq!(busy.tech_stack().unwrap().technologies[0].name, "nginx");
}

#[test]
fn test_removed_context_keeps_working_for_holders() {
    let ctx = TestContext::new(10);
    let host = fixtures::host();
    let context = ctx.registry.get_or_create(&host);

    assert!(ctx.registry.remove_context(&host));
    assert!(context.add_recent_request(fixtures::request_at("GET", "/", ctx.now())));
    assert!(ctx.registry.get(&host).is_none());
    assert_eq!(ctx.registry.stats().total_requests, 0);
}

#[test]
fn test_snapshot_serializes() {
    let ctx = TestContext::new(10);
    let context = ctx.registry.get_or_create("example.com");
    context.add_recent_request(fixtures::request_at("GET", "/api/users", START));
    ctx.registry
        .update_url_pattern(
            Some(&context),
            "/api/users",
            "GET",
            Some(fixtures::suspicious_note("lists users", "information disclosure")),
        )
        .unwrap();

    let json = serde_json::to_value(context.snapshot()).unwrap();
    assert_eq!(json["host"], "example.com");
    assert_eq!(json["request_count"], 1);
    assert_eq!(json["url_patterns"]["GET:/api/users"]["purpose"], "lists users");
}

#[tokio::test]
async fn test_background_sweep_then_shutdown() {
    telemetry::init_test_tracing();

    let clock = Arc::new(ManualClock::new(START));
    let config = RegistryConfig {
        cleanup_interval_secs: 1,
        ..RegistryConfig::manual(10)
    };
    let registry = ContextRegistry::with_clock(&config, clock.clone()).unwrap();
    assert!(registry.has_scheduler());

    let stale = registry.get_or_create("stale.com");
    stale.add_recent_request(fixtures::request_at("GET", "/", START));
    clock.advance(25 * HOUR);

    let mut evicted = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if registry.get("stale.com").is_none() {
            evicted = true;
            break;
        }
    }
    assert!(evicted, "sweep should run within a few seconds");
    assert!(registry.stats().last_global_cleanup >= clock.now());

    registry.shutdown().await;
    registry.shutdown().await;
    assert!(registry.is_stopped());
}

#[tokio::test]
async fn test_shutdown_cleans_remaining_contexts() {
    let clock = Arc::new(ManualClock::new(START));
    let config = RegistryConfig {
        cleanup_interval_secs: 3600,
        ..RegistryConfig::manual(10)
    };
    let registry = ContextRegistry::with_clock(&config, clock.clone()).unwrap();

    let context = registry.get_or_create("example.com");
    context.add_recent_request(fixtures::request_at("GET", "/", START));
    clock.advance(25 * HOUR);

    registry.shutdown().await;

    assert_eq!(registry.len(), 1, "shutdown cleans but does not evict");
    assert!(context.recent_requests().is_empty());
}
