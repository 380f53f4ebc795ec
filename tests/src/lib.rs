//! Shared helpers for the context registry integration tests.

pub mod fixtures;
