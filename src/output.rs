//! CLI output formatting for all build stages.
//!
//! # Output Format
//!
//! ## Translate / Check
//!
//! ```text
//! Build abc123
//!
//! Lambdas
//! 001 __NEXT_API_LAMBDA_0 (1 page)
//!     /api/hello → ./.next/serverless/pages/api/hello.js
//! 002 __NEXT_PAGE_LAMBDA_0 (5 pages)
//!     / → ./.next/serverless/pages/index.js
//!     ...
//!
//! Routes
//! 001 ^(?:\/((?:[^\/]+?)(?:\/(?:[^\/]+?))*))\/$ → 308 Location: /$1
//! 002 handle: filesystem
//! 003 ^/api/hello/?$ → __NEXT_API_LAMBDA_0 [/api/hello]
//! ...
//!
//! Prerenders
//!     /p-get-static-props → __NEXT_PAGE_LAMBDA_0
//!
//! Static
//!     /404
//! ```
//!
//! ## Bundle
//!
//! ```text
//! __NEXT_PAGE_LAMBDA_0 → build/__NEXT_PAGE_LAMBDA_0
//!     copy lambda output: 14 files
//!     write build info: 5 pages
//!     ...
//!     Archive: build/__NEXT_PAGE_LAMBDA_0.zip (12 files)
//!         .next/serverless/pages/index.js
//!         index.js
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure —
//! no I/O, no side effects.

use crate::bundle::{BundleEvent, BundleReport};
use crate::router::Resolution;
use crate::routes::{Phase, Route, RouteRule};
use crate::translate::Translation;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Filesystem => "filesystem",
        Phase::Hit => "hit",
        Phase::Error => "error",
    }
}

/// One route table entry on a single line.
///
/// ```text
/// ^/api/hello/?$ → __NEXT_API_LAMBDA_0 [/api/hello]
/// ^(?:\/(...))\/$ → 308 Location: /$1
/// handle: filesystem
/// ```
fn route_line(route: &Route) -> String {
    match route {
        Route::Handle { handle } => format!("handle: {}", phase_name(*handle)),
        Route::Rule(rule) => rule_line(rule),
    }
}

fn rule_line(rule: &RouteRule) -> String {
    let mut line = rule.src.clone();
    match (&rule.dest, rule.status) {
        (Some(dest), _) => line.push_str(&format!(" \u{2192} {dest}")),
        (None, Some(status)) => line.push_str(&format!(" \u{2192} {status}")),
        (None, None) => {}
    }
    match rule.page() {
        Some(page) => line.push_str(&format!(" [{page}]")),
        None => {
            for (name, value) in &rule.headers {
                line.push_str(&format!(" {name}: {value}"));
            }
        }
    }
    line
}

// ============================================================================
// Translate / Check
// ============================================================================

/// Format the translated manifests: lambdas with their pages, the route
/// table, prerenders and static routes.
pub fn format_translation(translation: &Translation) -> Vec<String> {
    let config = &translation.proxy_config;
    let mut lines = vec![format!("Build {}", config.build_id)];

    lines.push(String::new());
    lines.push("Lambdas".to_string());
    for (i, bundle) in translation.bundles.iter().enumerate() {
        let pages = &bundle.build_info.pages;
        lines.push(format!(
            "{} {} ({})",
            format_index(i + 1),
            bundle.kind.id(),
            plural(pages.len(), "page")
        ));
        for (page, file) in pages {
            lines.push(format!("    {page} \u{2192} {file}"));
        }
    }

    lines.push(String::new());
    lines.push("Routes".to_string());
    for (i, route) in config.routes.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), route_line(route)));
    }

    if !config.prerenders.is_empty() {
        lines.push(String::new());
        lines.push("Prerenders".to_string());
        for (path, prerender) in &config.prerenders {
            lines.push(format!("    {path} \u{2192} {}", prerender.lambda));
        }
    }

    if !config.static_routes.is_empty() {
        lines.push(String::new());
        lines.push("Static".to_string());
        for path in &config.static_routes {
            lines.push(format!("    {path}"));
        }
    }

    lines
}

pub fn print_translation(translation: &Translation) {
    for line in format_translation(translation) {
        println!("{}", line);
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// Format a single bundle progress event as display lines.
pub fn format_bundle_event(event: &BundleEvent) -> Vec<String> {
    match event {
        BundleEvent::Started { lambda, dir } => {
            vec![format!("{} \u{2192} {}", lambda.id(), dir.display())]
        }
        BundleEvent::StepDone { step, detail, .. } => {
            vec![format!("    {step}: {detail}")]
        }
        BundleEvent::Archived { archive, files, .. } => {
            let mut lines = vec![format!(
                "    Archive: {} ({})",
                archive.display(),
                plural(files.len(), "file")
            )];
            lines.extend(files.iter().map(|f| format!("        {f}")));
            lines
        }
    }
}

/// Format the end-of-build summary.
///
/// ```text
/// Wrote build/proxy-config.json
/// Built 2 bundles: __NEXT_API_LAMBDA_0.zip, __NEXT_PAGE_LAMBDA_0.zip
/// ```
pub fn format_build_summary(proxy_config: &Path, reports: &[BundleReport]) -> Vec<String> {
    let mut lines = vec![format!("Wrote {}", proxy_config.display())];
    let archives: Vec<String> = reports
        .iter()
        .map(|r| {
            r.archive
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| r.archive.display().to_string())
        })
        .collect();
    if archives.is_empty() {
        lines.push("No bundles: no lambda has routes".to_string());
    } else {
        lines.push(format!(
            "Built {}: {}",
            plural(archives.len(), "bundle"),
            archives.join(", ")
        ));
    }
    lines
}

pub fn print_build_summary(proxy_config: &Path, reports: &[BundleReport]) {
    for line in format_build_summary(proxy_config, reports) {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve
// ============================================================================

/// Format a routing decision. `handler` is the page's handler file, when
/// the request resolved to a page.
///
/// ```text
/// /posts/42 → /posts/[postId] (dynamic route)
///     Handler: ./.next/serverless/pages/posts/[postId].js
/// ```
pub fn format_resolution(uri: &str, resolution: &Resolution, handler: Option<&str>) -> Vec<String> {
    match resolution {
        Resolution::Page { target, page, via } => {
            let mut lines = vec![format!("{uri} \u{2192} {page} ({via})")];
            if target != uri {
                lines.push(format!("    Target: {target}"));
            }
            if let Some(file) = handler {
                lines.push(format!("    Handler: {file}"));
            }
            lines
        }
        Resolution::BadRequest(message) => {
            vec![format!("{uri} \u{2192} {} {message}", resolution.status().as_u16())]
        }
        Resolution::NotFound { target } => vec![
            format!("{uri} \u{2192} {} internal server error", resolution.status().as_u16()),
            format!("    No page for target {target}"),
        ],
    }
}

pub fn print_resolution(uri: &str, resolution: &Resolution, handler: Option<&str>) {
    for line in format_resolution(uri, resolution, handler) {
        println!("{}", line);
    }
}
