//! Builder manifest reading.
//!
//! The upstream serverless builder leaves two lambda directories behind, each
//! carrying JSON manifests that describe every route of the application:
//!
//! ```text
//! .serverless_nextjs/
//! ├── api-lambda/
//! │   └── manifest.json              # API routes
//! └── default-lambda/
//!     ├── manifest.json              # build id, SSR/HTML pages, public files
//!     ├── prerender-manifest.json    # prerendered routes and their data routes
//!     └── routes-manifest.json       # dynamic routes and data routes
//! ```
//!
//! All four are required. A missing file or malformed JSON means the upstream
//! build failed, and the error names the offending path.
//!
//! JSON objects are read into [`IndexMap`]s: the route table is emitted in
//! the order the builder wrote the keys, and dynamic-route query strings
//! follow the order of `routeKeys`.

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Manifest not found: {0}")]
    Missing(PathBuf),
    #[error("Cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed manifest {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Directory of the API lambda inside the builder output.
pub const API_LAMBDA_DIR: &str = "api-lambda";
/// Directory of the page (default) lambda inside the builder output.
pub const PAGE_LAMBDA_DIR: &str = "default-lambda";

/// The framework's built-in error page; never routed and never loaded.
pub const ERROR_PAGE: &str = "/_error";

/// `api-lambda/manifest.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiManifest {
    #[serde(default)]
    pub apis: ApiRoutes,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRoutes {
    /// Dynamic API routes. Only counted, never routed individually.
    #[serde(default)]
    pub dynamic: IndexMap<String, serde_json::Value>,
    /// API path → compiled handler file, e.g. `/api/hello` → `pages/api/hello.js`.
    #[serde(default)]
    pub non_dynamic: IndexMap<String, String>,
}

/// `default-lambda/manifest.json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageManifest {
    pub build_id: String,
    #[serde(default)]
    pub pages: PageRoutes,
    /// Public asset path → file name, e.g. `/favicon.ico` → `favicon.ico`.
    #[serde(default)]
    pub public_files: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRoutes {
    #[serde(default)]
    pub ssr: SsrPages,
    #[serde(default)]
    pub html: HtmlPages,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsrPages {
    #[serde(default)]
    pub dynamic: IndexMap<String, serde_json::Value>,
    /// Page path → compiled handler file, e.g. `/` → `pages/index.js`.
    #[serde(default)]
    pub non_dynamic: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlPages {
    #[serde(default)]
    pub dynamic: IndexMap<String, serde_json::Value>,
    /// Page path → static file, e.g. `/p-without-any` → `pages/p-without-any.html`.
    #[serde(default)]
    pub non_dynamic: IndexMap<String, String>,
}

/// `default-lambda/prerender-manifest.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrerenderManifest {
    #[serde(default)]
    pub routes: IndexMap<String, PrerenderRoute>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerenderRoute {
    /// JSON data endpoint, e.g. `/_next/data/abc123/p-get-static-props.json`.
    pub data_route: String,
    #[serde(default)]
    pub src_route: Option<String>,
}

/// `default-lambda/routes-manifest.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesManifest {
    #[serde(default)]
    pub dynamic_routes: Vec<DynamicRouteEntry>,
    #[serde(default)]
    pub data_routes: Vec<DataRouteEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicRouteEntry {
    /// Page name, e.g. `/posts/[postId]`.
    pub page: String,
    /// Regex with named capture groups, e.g. `^/posts/(?<postId>[^/]+?)(?:/)?$`.
    pub named_regex: String,
    /// Query key → capture group name. Order is significant.
    #[serde(default)]
    pub route_keys: IndexMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRouteEntry {
    pub page: String,
    pub data_route_regex: String,
}

/// The four builder manifests of one build.
#[derive(Debug, Clone)]
pub struct Manifests {
    pub api: ApiManifest,
    pub pages: PageManifest,
    pub prerender: PrerenderManifest,
    pub routes: RoutesManifest,
}

impl Manifests {
    /// Read all four manifests from the builder output directory.
    pub fn load(builder_output: &Path) -> Result<Self, ManifestError> {
        let api_dir = builder_output.join(API_LAMBDA_DIR);
        let page_dir = builder_output.join(PAGE_LAMBDA_DIR);
        Ok(Self {
            api: read_manifest(&api_dir.join("manifest.json"))?,
            pages: read_manifest(&page_dir.join("manifest.json"))?,
            prerender: read_manifest(&page_dir.join("prerender-manifest.json"))?,
            routes: read_manifest(&page_dir.join("routes-manifest.json"))?,
        })
    }

    pub fn build_id(&self) -> &str {
        &self.pages.build_id
    }

    /// Whether `path` is a prerendered route key.
    pub fn is_prerendered(&self, path: &str) -> bool {
        self.prerender.routes.contains_key(path)
    }

    /// Number of API routes, dynamic and non-dynamic.
    pub fn api_route_count(&self) -> usize {
        self.api.apis.dynamic.len() + self.api.apis.non_dynamic.len()
    }

    /// Number of server-rendered pages, dynamic and non-dynamic.
    pub fn page_route_count(&self) -> usize {
        self.pages.pages.ssr.dynamic.len() + self.pages.pages.ssr.non_dynamic.len()
    }
}

fn read_manifest<T: DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    if !path.is_file() {
        return Err(ManifestError::Missing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })
}
