//! Per-bundle build info.
//!
//! Every bundle carries a generated module that tells its router which pages
//! it can serve and how to find them:
//!
//! - `dynamicRoutes`: the dynamic-route `src`/`dest` pairs, for runtime
//!   fallback matching
//! - `buildId` and `escapedBuildId`: to recognize `/_next/data/<buildId>/...`
//! - `pages`: page name → lazy loader of the compiled handler file
//!
//! [`BuildInfo`] is the data; [`BuildInfo::render_module`] writes it as the
//! TypeScript module the bundler compiles into the entry point, and
//! [`crate::router::RouterConfig::from_build_info`] turns the same data into
//! a router configuration.

use crate::escape::escape_build_id;
use crate::manifest::{ERROR_PAGE, Manifests};
use crate::routes::{DynamicRoute, LambdaKind, dynamic_routes};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// File name of the generated module inside a bundle.
pub const BUILD_INFO_FILE: &str = "build-info.ts";

/// Directory holding compiled handlers, relative to the bundle root.
pub const SERVERLESS_DIR: &str = "./.next/serverless";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub dynamic_routes: Vec<DynamicRoute>,
    pub build_id: String,
    pub escaped_build_id: String,
    /// Page name → handler file, relative to the bundle root.
    pub pages: IndexMap<String, String>,
}

impl BuildInfo {
    /// Build info for one lambda kind.
    ///
    /// - API: every non-dynamic API route.
    /// - Page: every non-dynamic SSR page except the error page, then every
    ///   dynamic page.
    pub fn for_lambda(kind: LambdaKind, manifests: &Manifests) -> Self {
        let pages = match kind {
            LambdaKind::Api => manifests
                .api
                .apis
                .non_dynamic
                .iter()
                .map(|(page, file)| (page.clone(), handler_path(file)))
                .collect(),
            LambdaKind::Page => manifests
                .pages
                .pages
                .ssr
                .non_dynamic
                .iter()
                .filter(|(page, _)| page.as_str() != ERROR_PAGE)
                .map(|(page, file)| (page.clone(), handler_path(file)))
                .chain(
                    manifests
                        .routes
                        .dynamic_routes
                        .iter()
                        .map(|r| (r.page.clone(), handler_path(&dynamic_page_file(manifests, &r.page)))),
                )
                .collect(),
        };

        let build_id = manifests.build_id().to_string();
        Self {
            dynamic_routes: dynamic_routes(manifests),
            escaped_build_id: escape_build_id(&build_id),
            build_id,
            pages,
        }
    }

    /// Render as the TypeScript module compiled into the bundle entry point.
    pub fn render_module(&self) -> serde_json::Result<String> {
        let mut out = String::new();
        out.push_str("// This file is generated at build time. Don't modify manually.\n");
        out.push_str(&format!(
            "export const dynamicRoutes = {}\n",
            serde_json::to_string_pretty(&self.dynamic_routes)?
        ));
        out.push_str(&format!(
            "export const buildId = {}\n",
            js_string(&self.build_id)
        ));
        out.push_str(&format!(
            "export const escapedBuildId = {}\n",
            js_string(&self.escaped_build_id)
        ));
        out.push_str("export const pages = {\n");
        for (page, file) in &self.pages {
            out.push_str(&format!(
                "  {}: () => require({}),\n",
                js_string(page),
                js_string(file)
            ));
        }
        out.push('}');
        Ok(out)
    }
}

/// Compiled file of a dynamic page: the SSR manifest's `file` entry, or
/// `<page>.js` when the manifest does not name one.
fn dynamic_page_file(manifests: &Manifests, page: &str) -> String {
    manifests
        .pages
        .pages
        .ssr
        .dynamic
        .get(page)
        .and_then(|entry| entry.get("file"))
        .and_then(|file| file.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{page}.js"))
}

fn handler_path(file: &str) -> String {
    format!("{SERVERLESS_DIR}/{}", file.trim_start_matches('/'))
}

/// A JavaScript string literal (JSON string syntax is valid JavaScript).
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fixture_manifests;
    use pretty_assertions::assert_eq;

    #[test]
    fn api_pages_list_every_api_route() {
        let info = BuildInfo::for_lambda(LambdaKind::Api, &fixture_manifests());
        let pages: Vec<(&str, &str)> = info
            .pages
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pages,
            vec![("/api/hello", "./.next/serverless/pages/api/hello.js")]
        );
    }

    #[test]
    fn page_pages_skip_error_and_append_dynamic() {
        let info = BuildInfo::for_lambda(LambdaKind::Page, &fixture_manifests());
        let names: Vec<&str> = info.pages.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "/",
                "/p-get-initial-props",
                "/p-get-server-side-props",
                "/p-get-static-props",
                "/posts/[postId]"
            ]
        );
        assert_eq!(
            info.pages["/posts/[postId]"],
            "./.next/serverless/pages/posts/[postId].js"
        );
    }

    #[test]
    fn dynamic_page_without_file_entry_falls_back_to_page_name() {
        let mut manifests = fixture_manifests();
        manifests.pages.pages.ssr.dynamic.clear();
        let info = BuildInfo::for_lambda(LambdaKind::Page, &manifests);
        assert_eq!(
            info.pages["/posts/[postId]"],
            "./.next/serverless/posts/[postId].js"
        );
    }

    #[test]
    fn build_id_matches_manifest_for_both_kinds() {
        let manifests = fixture_manifests();
        for kind in LambdaKind::ALL {
            let info = BuildInfo::for_lambda(kind, &manifests);
            assert_eq!(info.build_id, manifests.build_id());
            assert_eq!(info.escaped_build_id, "abc123");
        }
    }

    #[test]
    fn both_kinds_carry_page_dynamic_routes() {
        let manifests = fixture_manifests();
        let api = BuildInfo::for_lambda(LambdaKind::Api, &manifests);
        let page = BuildInfo::for_lambda(LambdaKind::Page, &manifests);
        assert_eq!(api.dynamic_routes, page.dynamic_routes);
        assert_eq!(page.dynamic_routes[0].dest, "/posts/[postId]?postId=$postId");
    }

    #[test]
    fn render_module_text() {
        let mut pages = IndexMap::new();
        pages.insert(
            "/api/hello".to_string(),
            "./.next/serverless/pages/api/hello.js".to_string(),
        );
        let info = BuildInfo {
            dynamic_routes: vec![DynamicRoute {
                src: "^/posts/(?<postId>[^/]+?)(?:/)?$".into(),
                dest: "/posts/[postId]?postId=$postId".into(),
            }],
            build_id: "abc123".into(),
            escaped_build_id: "abc123".into(),
            pages,
        };

        let expected = r#"// This file is generated at build time. Don't modify manually.
export const dynamicRoutes = [
  {
    "src": "^/posts/(?<postId>[^/]+?)(?:/)?$",
    "dest": "/posts/[postId]?postId=$postId"
  }
]
export const buildId = "abc123"
export const escapedBuildId = "abc123"
export const pages = {
  "/api/hello": () => require("./.next/serverless/pages/api/hello.js"),
}"#;
        assert_eq!(info.render_module().unwrap(), expected);
    }

    #[test]
    fn render_module_escapes_string_literals() {
        let info = BuildInfo {
            dynamic_routes: vec![],
            build_id: "a.b".into(),
            escaped_build_id: r"a\.b".into(),
            pages: IndexMap::new(),
        };
        let module = info.render_module().unwrap();
        assert!(module.contains(r#"export const escapedBuildId = "a\\.b""#));
        assert!(module.contains("export const dynamicRoutes = []"));
    }

    #[test]
    fn handler_path_joins_serverless_dir() {
        assert_eq!(handler_path("pages/index.js"), "./.next/serverless/pages/index.js");
        assert_eq!(handler_path("/posts/[postId].js"), "./.next/serverless/posts/[postId].js");
    }
}
