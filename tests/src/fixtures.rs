//! Test fixtures and record generators.

use chrono::Utc;
use context_core::{FormField, HtmlForm, TimedRequest, UrlNote};
use uuid::Uuid;

/// A request observed now.
pub fn request(method: &str, path: &str) -> TimedRequest {
    request_at(method, path, Utc::now().timestamp())
}

/// A request observed at `timestamp`, with a session id attached.
pub fn request_at(method: &str, path: &str, timestamp: i64) -> TimedRequest {
    let mut request = TimedRequest::new(method, path, 200, timestamp);
    request.session_id = Some(Uuid::new_v4().to_string());
    request
}

/// N requests to distinct paths, all at `timestamp`.
pub fn requests_at(n: usize, timestamp: i64) -> Vec<TimedRequest> {
    (0..n)
        .map(|i| request_at("GET", &format!("/api/items/{}", i), timestamp))
        .collect()
}

/// A login form with a CSRF token.
pub fn login_form(action: &str, first_seen: i64) -> HtmlForm {
    HtmlForm::new(action, "POST", first_seen)
        .with_field(FormField::new("username", "text", false))
        .with_field(FormField::new("password", "password", true))
        .with_csrf_token("csrf_token")
}

/// A plain annotation.
pub fn note(content: &str) -> UrlNote {
    UrlNote::new(content, 0.8)
}

/// An annotation flagged as a likely vulnerability.
pub fn suspicious_note(content: &str, hint: &str) -> UrlNote {
    UrlNote::new(content, 0.9).suspicious(hint)
}

/// A unique host name.
pub fn host() -> String {
    format!("{}.example.com", &Uuid::new_v4().simple().to_string()[..8])
}
