//! Shared test utilities for the next-lambda-adapter test suite.
//!
//! Provides fixture setup for the sample project under `fixtures/project/`
//! and lookup helpers over translated route tables.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let routes = build_routes(&fixture_manifests());
//! let rule = rule_for_page(&routes, "/api/hello");
//! assert_eq!(rule.dest.as_deref(), Some("__NEXT_API_LAMBDA_0"));
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::archive::copy_dir;
use crate::config::{AdapterConfig, load_config};
use crate::manifest::Manifests;
use crate::routes::{Route, RouteRule};

// =========================================================================
// Fixture setup
// =========================================================================

fn fixture_project() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project")
}

/// Copy `fixtures/project/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    copy_dir(&fixture_project(), tmp.path()).unwrap();
    tmp
}

/// Copy only the builder output (`api-lambda/`, `default-lambda/`) to a
/// temp directory.
pub fn setup_builder_output() -> TempDir {
    let tmp = TempDir::new().unwrap();
    copy_dir(&fixture_project().join(".serverless_nextjs"), tmp.path()).unwrap();
    tmp
}

/// The fixture project's config: stock paths, copying bundler.
pub fn test_config() -> AdapterConfig {
    load_config(&fixture_project()).unwrap()
}

/// Manifests of the fixture project, read in place.
pub fn fixture_manifests() -> Manifests {
    Manifests::load(&fixture_project().join(".serverless_nextjs")).unwrap()
}

/// Build manifests from inline JSON. Missing sections take their defaults.
pub fn manifests_from_json(
    api: serde_json::Value,
    pages: serde_json::Value,
    prerender: serde_json::Value,
    routes: serde_json::Value,
) -> Manifests {
    Manifests {
        api: serde_json::from_value(api).unwrap(),
        pages: serde_json::from_value(pages).unwrap(),
        prerender: serde_json::from_value(prerender).unwrap(),
        routes: serde_json::from_value(routes).unwrap(),
    }
}

// =========================================================================
// Route lookups
// =========================================================================

/// Find the first rule that tags requests with `page`. Panics with the
/// available pages if none does.
pub fn rule_for_page<'a>(routes: &'a [Route], page: &str) -> &'a RouteRule {
    routes
        .iter()
        .filter_map(Route::as_rule)
        .find(|r| r.page() == Some(page))
        .unwrap_or_else(|| {
            let available: Vec<&str> = routes
                .iter()
                .filter_map(Route::as_rule)
                .filter_map(RouteRule::page)
                .collect();
            panic!("No rule for page '{page}'. Available: {available:?}")
        })
}

/// All rules whose `src` contains `needle`.
pub fn rules_with_src<'a>(routes: &'a [Route], needle: &str) -> Vec<&'a RouteRule> {
    routes
        .iter()
        .filter_map(Route::as_rule)
        .filter(|r| r.src.contains(needle))
        .collect()
}
