//! Bound and eviction behavior across the registry and its contexts.

use context_core::{ResourceLimits, ResourceMapping};
use integration_tests::{
    fixtures,
    setup::{TestContext, START},
};

#[test]
fn test_oldest_context_evicted_at_capacity() {
    let ctx = TestContext::new(3);

    let a = ctx.registry.get_or_create("a");
    ctx.registry.get_or_create("b");
    let c = ctx.registry.get_or_create("c");

    ctx.clock.advance(30);
    a.add_recent_request(fixtures::request_at("GET", "/", ctx.now()));
    c.update_url_pattern("GET:/", None, Some(fixtures::note("root")))
        .unwrap();

    ctx.registry.get_or_create("d");

    let mut hosts = ctx.registry.all_hosts();
    hosts.sort();
    assert_eq!(hosts, vec!["a", "c", "d"]);
}

#[test]
fn test_recent_requests_keep_newest() {
    let ctx = TestContext::new(10);
    let context = ctx.registry.get_or_create("example.com");

    for n in 1..=60 {
        let mut request = fixtures::request_at("GET", &format!("/page/{}", n), START);
        request.id = format!("req-{}", n);
        assert!(context.add_recent_request(request));
    }

    let recent = context.recent_requests();
    assert_eq!(recent.len(), 50);
    assert_eq!(recent.first().unwrap().id, "req-11");
    assert_eq!(recent.last().unwrap().id, "req-60");
    assert_eq!(context.request_count(), 60);
}

#[test]
fn test_rejected_limits_leave_policy_intact() {
    let ctx = TestContext::new(10);
    let before = ctx.registry.limits();

    let err = ctx
        .registry
        .update_limits(ResourceLimits {
            max_recent_requests: -1,
            ..before
        })
        .unwrap_err();

    assert!(err.to_string().contains("MaxRecentRequests must be positive"));
    assert_eq!(ctx.registry.limits(), before);
}

#[test]
fn test_oversized_limits_fail_validation() {
    let ctx = TestContext::new(10);
    ctx.registry
        .update_limits(ResourceLimits {
            max_forms: 10_000,
            ..ResourceLimits::default()
        })
        .unwrap();

    let err = ctx.registry.validate_limits().unwrap_err();
    assert!(err.to_string().contains("MaxForms too large"));
}

#[test]
fn test_all_collections_bounded_by_small_limits() {
    let limits = ResourceLimits {
        max_recent_requests: 3,
        max_forms: 2,
        max_resources: 2,
        max_url_patterns: 2,
        max_notes_per_url: 2,
        max_age_secs: 3600,
    };
    let ctx = TestContext::with_limits(5, limits);
    let context = ctx.registry.get_or_create("example.com");

    for request in fixtures::requests_at(10, START) {
        context.add_recent_request(request);
    }
    for n in 0..5 {
        context.add_form(fixtures::login_form(&format!("/login/{}", n), START + n));
        context.add_resource_mapping(
            format!("/api/items/{}", n),
            ResourceMapping::new(format!("/api/items/{}", n), START + n),
        );
        for _ in 0..4 {
            ctx.registry
                .update_url_pattern(
                    Some(&context),
                    &format!("/api/items/{}", n),
                    "GET",
                    Some(fixtures::suspicious_note("id in path", "IDOR")),
                )
                .unwrap();
        }
    }

    let stats = context.stats();
    assert_eq!(stats.recent_requests, 3);
    assert_eq!(stats.forms, 2);
    assert_eq!(stats.resources, 2);
    assert_eq!(stats.url_patterns, 2);
    assert_eq!(stats.request_count, 10);

    let snapshot = context.snapshot();
    assert!(snapshot.url_patterns.values().all(|p| p.notes.len() <= 2));

    // Newest forms survive
    assert!(context
        .form(&context_core::HtmlForm::derive_id("/login/4", "POST"))
        .is_some());
    assert!(context
        .form(&context_core::HtmlForm::derive_id("/login/0", "POST"))
        .is_none());
}

#[test]
fn test_same_form_reextracted_is_idempotent() {
    let ctx = TestContext::new(5);
    let context = ctx.registry.get_or_create("example.com");

    context.add_form(fixtures::login_form("/login", START));
    context.add_form(fixtures::login_form("/login", START + 10));

    assert_eq!(context.stats().forms, 1);
}

#[test]
fn test_crud_detection_accumulates() {
    let ctx = TestContext::new(5);
    let context = ctx.registry.get_or_create("api.example.com");

    assert!(context.record_crud_operation("/api/users", "GET", "/api/users/1"));
    assert!(context.record_crud_operation("/api/users", "POST", "/api/users"));
    assert!(!context.resource_mapping("/api/users").unwrap().has_full_crud());
    assert!(context.record_crud_operation("/api/users", "PATCH", "/api/users/2"));
    assert!(context.record_crud_operation("/api/users", "DELETE", "/api/users/1"));
    assert!(!context.record_crud_operation("/api/users", "GET", "/api/users/3"));

    let mapping = context.resource_mapping("/api/users").unwrap();
    assert!(mapping.has_full_crud());
    assert_eq!(mapping.related_paths.len(), 3);
}
