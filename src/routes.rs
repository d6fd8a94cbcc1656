//! Route table construction.
//!
//! Translates the builder manifests into the ordered route list of
//! `proxy-config.json`. The list is a phase pipeline, not a set: the proxy
//! walks it top to bottom and the position of every rule decides which
//! phase it belongs to.
//!
//! ```text
//! 1. trailing-slash redirect      (308, continue)
//! 2. { handle: filesystem }
//! 3. API routes                   → __NEXT_API_LAMBDA_0
//! 4. SSR pages (not prerendered)  → __NEXT_PAGE_LAMBDA_0
//! 5. data routes (not prerendered)→ page path
//! 6. prerendered pages            → /__NEXT_PAGE_LAMBDA_0
//! 7. dynamic routes (regex)       → page?key=$capture
//! 8. dynamic routes (literal)     → /__NEXT_PAGE_LAMBDA_0
//! 9. { handle: hit }, { handle: error }, catch-all 404
//! ```
//!
//! Steps 7 and 8 both walk the dynamic routes: the regex rule serves real
//! requests such as `/posts/42`, the literal rule serves direct hits on the
//! canonical page name `/posts/[postId]`.
//!
//! Rules that target a lambda carry the resolved page name in the
//! [`PAGE_HEADER`] header so the lambda's router does not re-parse the URL.

use crate::escape::{escape_hyphens, escape_route_path, normalize_data_route_regex};
use crate::manifest::{DynamicRouteEntry, ERROR_PAGE, Manifests};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header carrying the resolved page name from the proxy to the lambda.
pub const PAGE_HEADER: &str = "x-nextjs-page";

/// Matches any path with one trailing slash; `$1` is the path without it.
pub const TRAILING_SLASH_SRC: &str = r"^(?:\/((?:[^\/]+?)(?:\/(?:[^\/]+?))*))\/$";

/// The two lambdas a deployment is split into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LambdaKind {
    Api,
    Page,
}

impl LambdaKind {
    pub const ALL: [LambdaKind; 2] = [LambdaKind::Api, LambdaKind::Page];

    /// Bare lambda identifier, also the bundle directory name.
    pub fn id(self) -> &'static str {
        match self {
            LambdaKind::Api => "__NEXT_API_LAMBDA_0",
            LambdaKind::Page => "__NEXT_PAGE_LAMBDA_0",
        }
    }

    /// Identifier in route form, as listed in `lambdaRoutes`.
    pub fn route(self) -> String {
        format!("/{}", self.id())
    }

    /// Directory of this lambda inside the builder output.
    pub fn builder_dir(self) -> &'static str {
        match self {
            LambdaKind::Api => crate::manifest::API_LAMBDA_DIR,
            LambdaKind::Page => crate::manifest::PAGE_LAMBDA_DIR,
        }
    }
}

impl fmt::Display for LambdaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LambdaKind::Api => f.write_str("api"),
            LambdaKind::Page => f.write_str("page"),
        }
    }
}

/// Routing phase delimited by a [`Route::Handle`] marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Filesystem,
    Hit,
    Error,
}

/// One entry of the route table: a phase marker or a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Route {
    Handle { handle: Phase },
    Rule(RouteRule),
}

impl Route {
    pub fn handle(phase: Phase) -> Self {
        Route::Handle { handle: phase }
    }

    pub fn as_rule(&self) -> Option<&RouteRule> {
        match self {
            Route::Rule(rule) => Some(rule),
            Route::Handle { .. } => None,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            Route::Handle { handle } => Some(*handle),
            Route::Rule(_) => None,
        }
    }
}

impl From<RouteRule> for Route {
    fn from(rule: RouteRule) -> Self {
        Route::Rule(rule)
    }
}

/// A request pattern and what to do with matching requests.
///
/// Built with the consuming setters below and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Continue with the next phase when the destination itself 404s.
    #[serde(default, skip_serializing_if = "is_false")]
    pub check: bool,
    /// Keep matching after this rule (trailing-slash redirect only).
    #[serde(default, rename = "continue", skip_serializing_if = "is_false")]
    pub continue_matching: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl RouteRule {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dest: None,
            headers: IndexMap::new(),
            status: None,
            check: false,
            continue_matching: false,
        }
    }

    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn check(mut self) -> Self {
        self.check = true;
        self
    }

    pub fn continue_matching(mut self) -> Self {
        self.continue_matching = true;
        self
    }

    /// Page name tagged into [`PAGE_HEADER`], if any.
    pub fn page(&self) -> Option<&str> {
        self.headers.get(PAGE_HEADER).map(String::as_str)
    }

    /// Rule routing `^<pattern>/?$` to a lambda, tagged with the page name.
    fn lambda_rule(pattern: &str, lambda: impl Into<String>, page: &str) -> Self {
        RouteRule::new(format!("^{pattern}/?$"))
            .dest(lambda)
            .header(PAGE_HEADER, page)
            .check()
    }
}

/// A dynamic page matched by a named-capture regex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicRoute {
    /// Named-capture regex, e.g. `^/posts/(?<postId>[^/]+?)(?:/)?$`.
    pub src: String,
    /// Page with captured values as query, e.g. `/posts/[postId]?postId=$postId`.
    pub dest: String,
}

impl DynamicRoute {
    pub fn from_entry(entry: &DynamicRouteEntry) -> Self {
        Self {
            src: entry.named_regex.clone(),
            dest: format!("{}?{}", entry.page, dynamic_query_string(&entry.route_keys)),
        }
    }

    /// Destination path without query string or fragment.
    pub fn dest_path(&self) -> &str {
        self.dest
            .split(['?', '#'])
            .next()
            .unwrap_or(self.dest.as_str())
    }

    fn to_rule(&self) -> RouteRule {
        RouteRule::new(self.src.clone()).dest(self.dest.clone()).check()
    }
}

/// Rebuild a query string from route keys: `key=$capture` joined by `&`,
/// in route-key order.
pub fn dynamic_query_string(route_keys: &IndexMap<String, String>) -> String {
    route_keys
        .iter()
        .map(|(key, capture)| format!("{key}=${capture}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Dynamic routes of the page lambda, in routes-manifest order.
pub fn dynamic_routes(manifests: &Manifests) -> Vec<DynamicRoute> {
    manifests
        .routes
        .dynamic_routes
        .iter()
        .map(DynamicRoute::from_entry)
        .collect()
}

/// Build the complete, ordered route table.
pub fn build_routes(manifests: &Manifests) -> Vec<Route> {
    let api_lambda = LambdaKind::Api.id();
    let page_lambda = LambdaKind::Page.id();
    let page_lambda_route = LambdaKind::Page.route();
    let dynamic = dynamic_routes(manifests);

    let mut routes = vec![
        RouteRule::new(TRAILING_SLASH_SRC)
            .header("Location", "/$1")
            .status(308)
            .continue_matching()
            .into(),
        Route::handle(Phase::Filesystem),
    ];

    routes.extend(
        manifests
            .api
            .apis
            .non_dynamic
            .keys()
            .map(|path| RouteRule::lambda_rule(path, api_lambda, path).into()),
    );

    routes.extend(
        manifests
            .pages
            .pages
            .ssr
            .non_dynamic
            .keys()
            .filter(|path| path.as_str() != ERROR_PAGE && !manifests.is_prerendered(path))
            .map(|path| RouteRule::lambda_rule(&escape_route_path(path), page_lambda, path).into()),
    );

    routes.extend(
        manifests
            .routes
            .data_routes
            .iter()
            .filter(|data| !manifests.is_prerendered(&data.page))
            .map(|data| {
                RouteRule::new(normalize_data_route_regex(&data.data_route_regex))
                    .dest(data.page.clone())
                    .check()
                    .into()
            }),
    );

    routes.extend(manifests.prerender.routes.keys().map(|path| {
        RouteRule::lambda_rule(&escape_hyphens(path), page_lambda_route.clone(), path).into()
    }));

    routes.extend(dynamic.iter().map(|route| route.to_rule().into()));

    routes.extend(manifests.routes.dynamic_routes.iter().map(|entry| {
        RouteRule::lambda_rule(
            &escape_route_path(&entry.page),
            page_lambda_route.clone(),
            &entry.page,
        )
        .into()
    }));

    routes.push(Route::handle(Phase::Hit));
    routes.push(Route::handle(Phase::Error));
    routes.push(RouteRule::new("/.*").dest("/404").status(404).into());

    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{fixture_manifests, manifests_from_json, rule_for_page, rules_with_src};
    use pretty_assertions::assert_eq;

    #[test]
    fn rule_serializes_in_field_order() {
        let rule = RouteRule::new("^/a/?$")
            .dest("__NEXT_API_LAMBDA_0")
            .header(PAGE_HEADER, "/a")
            .check();
        let json = serde_json::to_string(&Route::from(rule)).unwrap();
        assert_eq!(
            json,
            r#"{"src":"^/a/?$","dest":"__NEXT_API_LAMBDA_0","headers":{"x-nextjs-page":"/a"},"check":true}"#
        );
    }

    #[test]
    fn phase_marker_serializes_as_handle() {
        let json = serde_json::to_string(&Route::handle(Phase::Filesystem)).unwrap();
        assert_eq!(json, r#"{"handle":"filesystem"}"#);
    }

    #[test]
    fn trailing_slash_rule_serialization() {
        let routes = build_routes(&fixture_manifests());
        let json = serde_json::to_value(&routes[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "src": TRAILING_SLASH_SRC,
                "headers": {"Location": "/$1"},
                "status": 308,
                "continue": true
            })
        );
    }

    #[test]
    fn route_round_trips_through_json() {
        let routes = build_routes(&fixture_manifests());
        let json = serde_json::to_string(&routes).unwrap();
        let back: Vec<Route> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, routes);
    }

    #[test]
    fn lambda_identifiers() {
        assert_eq!(LambdaKind::Api.id(), "__NEXT_API_LAMBDA_0");
        assert_eq!(LambdaKind::Page.route(), "/__NEXT_PAGE_LAMBDA_0");
        assert_eq!(LambdaKind::Page.builder_dir(), "default-lambda");
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[test]
    fn phase_ordering_invariant() {
        let routes = build_routes(&fixture_manifests());
        let n = routes.len();

        assert_eq!(routes[0].as_rule().unwrap().status, Some(308));
        assert_eq!(routes[1].phase(), Some(Phase::Filesystem));
        assert!(routes[2..n - 3].iter().all(|r| r.as_rule().is_some()));
        assert_eq!(routes[n - 3].phase(), Some(Phase::Hit));
        assert_eq!(routes[n - 2].phase(), Some(Phase::Error));
        let last = routes[n - 1].as_rule().unwrap();
        assert_eq!(last.src, "/.*");
        assert_eq!(last.dest.as_deref(), Some("/404"));
        assert_eq!(last.status, Some(404));
    }

    #[test]
    fn phase_ordering_holds_for_empty_manifests() {
        let manifests = manifests_from_json(
            serde_json::json!({}),
            serde_json::json!({"buildId": "empty"}),
            serde_json::json!({}),
            serde_json::json!({}),
        );
        let routes = build_routes(&manifests);
        let phases: Vec<Option<Phase>> = routes.iter().map(Route::phase).collect();
        assert_eq!(
            phases,
            vec![
                None,
                Some(Phase::Filesystem),
                Some(Phase::Hit),
                Some(Phase::Error),
                None
            ]
        );
    }

    #[test]
    fn fixture_table_order() {
        let routes = build_routes(&fixture_manifests());
        let srcs: Vec<&str> = routes
            .iter()
            .filter_map(Route::as_rule)
            .map(|r| r.src.as_str())
            .collect();
        assert_eq!(
            srcs,
            vec![
                TRAILING_SLASH_SRC,
                "^/api/hello/?$",
                "^//?$",
                r"^/p\-get\-initial\-props/?$",
                r"^/p\-get\-server\-side\-props/?$",
                r"^\/_next\/data\/abc123\/p\-get\-server\-side\-props.json$",
                r"^/p\-get\-static\-props/?$",
                "^/posts/(?<postId>[^/]+?)(?:/)?$",
                r"^/posts/\[postId\]/?$",
                "/.*",
            ]
        );
    }

    // =========================================================================
    // Individual steps
    // =========================================================================

    #[test]
    fn api_rule_targets_api_lambda_unescaped() {
        let routes = build_routes(&fixture_manifests());
        let rule = rule_for_page(&routes, "/api/hello");
        assert_eq!(rule.src, "^/api/hello/?$");
        assert_eq!(rule.dest.as_deref(), Some("__NEXT_API_LAMBDA_0"));
        assert!(rule.check);
    }

    #[test]
    fn error_page_gets_no_rule() {
        let routes = build_routes(&fixture_manifests());
        assert!(
            routes
                .iter()
                .filter_map(Route::as_rule)
                .all(|r| r.page() != Some("/_error"))
        );
    }

    #[test]
    fn prerendered_page_has_exactly_one_rule() {
        let manifests = fixture_manifests();
        let routes = build_routes(&manifests);
        for key in manifests.prerender.routes.keys() {
            let tagged: Vec<&RouteRule> = routes
                .iter()
                .filter_map(Route::as_rule)
                .filter(|r| r.page() == Some(key.as_str()))
                .collect();
            assert_eq!(tagged.len(), 1, "rules tagged {key}");
            assert_eq!(tagged[0].dest.as_deref(), Some("/__NEXT_PAGE_LAMBDA_0"));
        }
    }

    #[test]
    fn prerendered_data_route_is_skipped() {
        let routes = build_routes(&fixture_manifests());
        assert!(rules_with_src(&routes, "p\\-get\\-static\\-props.json").is_empty());
        let ssr_data = rules_with_src(&routes, "p\\-get\\-server\\-side\\-props.json");
        assert_eq!(ssr_data.len(), 1);
        assert_eq!(ssr_data[0].dest.as_deref(), Some("/p-get-server-side-props"));
        assert!(ssr_data[0].headers.is_empty());
    }

    #[test]
    fn ssr_rule_targets_bare_page_lambda() {
        let routes = build_routes(&fixture_manifests());
        let rule = rule_for_page(&routes, "/p-get-server-side-props");
        assert_eq!(rule.dest.as_deref(), Some("__NEXT_PAGE_LAMBDA_0"));
    }

    #[test]
    fn dynamic_route_produces_regex_and_literal_rules() {
        let routes = build_routes(&fixture_manifests());
        let regex_rules = rules_with_src(&routes, "(?<postId>");
        assert_eq!(regex_rules.len(), 1);
        assert_eq!(
            regex_rules[0].dest.as_deref(),
            Some("/posts/[postId]?postId=$postId")
        );
        assert!(regex_rules[0].headers.is_empty());

        let literal = rule_for_page(&routes, "/posts/[postId]");
        assert_eq!(literal.src, r"^/posts/\[postId\]/?$");
        assert_eq!(literal.dest.as_deref(), Some("/__NEXT_PAGE_LAMBDA_0"));
    }

    // =========================================================================
    // Dynamic query strings
    // =========================================================================

    #[test]
    fn single_key_query_string() {
        let mut keys = IndexMap::new();
        keys.insert("postId".to_string(), "postId".to_string());
        assert_eq!(dynamic_query_string(&keys), "postId=$postId");
    }

    #[test]
    fn multi_key_query_string_keeps_insertion_order() {
        let mut keys = IndexMap::new();
        keys.insert("type".to_string(), "type".to_string());
        keys.insert("postId".to_string(), "nxtPpostId".to_string());
        assert_eq!(dynamic_query_string(&keys), "type=$type&postId=$nxtPpostId");
    }

    #[test]
    fn empty_route_keys_give_empty_query() {
        assert_eq!(dynamic_query_string(&IndexMap::new()), "");
    }

    #[test]
    fn dest_path_strips_query() {
        let route = DynamicRoute {
            src: "^/x$".into(),
            dest: "/posts/[postId]?postId=$postId".into(),
        };
        assert_eq!(route.dest_path(), "/posts/[postId]");
    }
}
