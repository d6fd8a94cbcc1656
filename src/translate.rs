//! Manifest translation.
//!
//! The pure half of the build: four manifests in, one [`Translation`] out.
//! Nothing here touches the filesystem, so every table the proxy and the
//! bundles depend on can be tested from in-memory manifests.
//!
//! ## Output
//!
//! ```text
//! Translation
//! ├── proxy_config        → build/proxy-config.json
//! │   ├── buildId
//! │   ├── lambdaRoutes    lambdas that have at least one route
//! │   ├── prerenders      page path and data path → page lambda
//! │   ├── routes          ordered route table (see `routes`)
//! │   └── staticRoutes    HTML pages and public files, served without a lambda
//! └── bundles             one BuildInfo per lambda in lambdaRoutes
//! ```

use crate::build_info::BuildInfo;
use crate::manifest::Manifests;
use crate::routes::{LambdaKind, Route, build_routes};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// File name of the proxy config inside the build directory.
pub const PROXY_CONFIG_FILE: &str = "proxy-config.json";

/// The routing document consumed by the proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub build_id: String,
    pub lambda_routes: Vec<String>,
    pub prerenders: IndexMap<String, Prerender>,
    pub routes: Vec<Route>,
    pub static_routes: Vec<String>,
}

impl ProxyConfig {
    /// Pretty-printed JSON, two-space indent.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prerender {
    pub lambda: String,
}

/// A bundle to assemble: which lambda, and the build info it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleSpec {
    pub kind: LambdaKind,
    pub build_info: BuildInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub proxy_config: ProxyConfig,
    pub bundles: Vec<BundleSpec>,
}

/// Translate the builder manifests into the proxy config and bundle specs.
pub fn translate(manifests: &Manifests) -> Translation {
    let kinds = lambda_kinds(manifests);
    let proxy_config = ProxyConfig {
        build_id: manifests.build_id().to_string(),
        lambda_routes: kinds.iter().map(|k| k.route()).collect(),
        prerenders: prerenders(manifests),
        routes: build_routes(manifests),
        static_routes: static_routes(manifests),
    };
    let bundles = kinds
        .into_iter()
        .map(|kind| BundleSpec {
            kind,
            build_info: BuildInfo::for_lambda(kind, manifests),
        })
        .collect();

    Translation {
        proxy_config,
        bundles,
    }
}

/// Lambda kinds with at least one route, API first.
pub fn lambda_kinds(manifests: &Manifests) -> Vec<LambdaKind> {
    LambdaKind::ALL
        .into_iter()
        .filter(|kind| match kind {
            LambdaKind::Api => manifests.api_route_count() > 0,
            LambdaKind::Page => manifests.page_route_count() > 0,
        })
        .collect()
}

/// Static HTML pages (`pages/about.html` → `/about`), then public files.
pub fn static_routes(manifests: &Manifests) -> Vec<String> {
    let html = manifests
        .pages
        .pages
        .html
        .non_dynamic
        .values()
        .map(|file| {
            let path = file.strip_prefix("pages").unwrap_or(file);
            path.strip_suffix(".html").unwrap_or(path).to_string()
        });
    let public = manifests.pages.public_files.keys().cloned();
    html.chain(public).collect()
}

/// Every prerendered route and its data route, both served by the page lambda.
pub fn prerenders(manifests: &Manifests) -> IndexMap<String, Prerender> {
    let mut out = IndexMap::new();
    for (path, route) in &manifests.prerender.routes {
        for key in [&route.data_route, path] {
            out.insert(
                key.clone(),
                Prerender {
                    lambda: LambdaKind::Page.id().to_string(),
                },
            );
        }
    }
    out
}
