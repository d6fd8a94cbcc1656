//! Request router of a bundle.
//!
//! Every request that reaches a lambda is mapped to exactly one page handler:
//!
//! ```text
//! x-nextjs-page header ─┐
//!                       ├─▶ target ─▶ pages[target]
//! request path ─────────┘               │ miss
//!                                       ├─▶ /_next/data/<buildId>/x.json → pages[/x]
//!                                       │ miss
//!                                       ├─▶ first dynamic route matching target → pages[dest]
//!                                       │ miss
//!                                       └─▶ 500 internal server error
//! ```
//!
//! The proxy normally sets the header, so the path is only a fallback for
//! direct invocations. [`Router::resolve`] makes the decision without calling
//! anything; [`Router::dispatch`] loads the page module (once per process)
//! and invokes its handler.

use crate::build_info::BuildInfo;
use crate::handler::{HandlerError, LoadError, Loader};
use crate::routes::{DynamicRoute, PAGE_HEADER};
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Request, Response, StatusCode};
use indexmap::IndexMap;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Prefix every Next.js data request starts with.
pub const DATA_ROUTE_MARKER: &str = "/_next/data/";
/// Target used when the path is empty after trailing-slash removal.
pub const INDEX_PAGE: &str = "/index";

pub const INVALID_HEADER: &str = "invalid x-nextjs-page header";
pub const BAD_REQUEST: &str = "Bad Request";
pub const INTERNAL_ERROR: &str = "internal server error";

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid regex for dynamic route {dest}: {source}")]
    DynamicRoute { dest: String, source: regex::Error },
    #[error("invalid build id pattern {pattern}: {source}")]
    BuildId {
        pattern: String,
        source: regex::Error,
    },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("handler for {page} failed: {source}")]
    Handler { page: String, source: HandlerError },
}

struct CompiledRoute {
    regex: Regex,
    route: DynamicRoute,
}

/// Immutable router state, built once at cold start.
pub struct RouterConfig {
    build_id: String,
    data_prefix: Regex,
    dynamic_routes: Vec<CompiledRoute>,
    pages: IndexMap<String, Loader>,
}

impl RouterConfig {
    /// `escaped_build_id` must already be regex-escaped.
    pub fn new(
        build_id: impl Into<String>,
        escaped_build_id: &str,
        dynamic_routes: &[DynamicRoute],
        pages: IndexMap<String, Loader>,
    ) -> Result<Self, RouterError> {
        let pattern = format!("{DATA_ROUTE_MARKER}{escaped_build_id}/");
        let data_prefix = Regex::new(&pattern).map_err(|source| RouterError::BuildId {
            pattern: pattern.clone(),
            source,
        })?;
        let dynamic_routes = dynamic_routes
            .iter()
            .map(|route| {
                Regex::new(&route.src)
                    .map(|regex| CompiledRoute {
                        regex,
                        route: route.clone(),
                    })
                    .map_err(|source| RouterError::DynamicRoute {
                        dest: route.dest.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            build_id: build_id.into(),
            data_prefix,
            dynamic_routes,
            pages,
        })
    }

    /// Router config for a bundle's build info. `make_loader` receives the
    /// page name and its handler file.
    pub fn from_build_info<F>(info: &BuildInfo, make_loader: F) -> Result<Self, RouterError>
    where
        F: Fn(&str, &str) -> Loader,
    {
        let pages = info
            .pages
            .iter()
            .map(|(page, file)| (page.clone(), make_loader(page, file)))
            .collect();
        Self::new(
            info.build_id.clone(),
            &info.escaped_build_id,
            &info.dynamic_routes,
            pages,
        )
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn page_names(&self) -> impl Iterator<Item = &str> {
        self.pages.keys().map(String::as_str)
    }
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("build_id", &self.build_id)
            .field("dynamic_routes", &self.dynamic_routes.len())
            .field("pages", &self.pages.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// How a page was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Via {
    Direct,
    DataRoute,
    Dynamic,
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Via::Direct => "direct",
            Via::DataRoute => "data route",
            Via::Dynamic => "dynamic route",
        })
    }
}

/// Routing decision for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Page {
        target: String,
        page: String,
        via: Via,
    },
    BadRequest(&'static str),
    NotFound {
        target: String,
    },
}

impl Resolution {
    pub fn status(&self) -> StatusCode {
        match self {
            Resolution::Page { .. } => StatusCode::OK,
            Resolution::BadRequest(_) => StatusCode::BAD_REQUEST,
            Resolution::NotFound { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Router {
    config: Arc<RouterConfig>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn resolve<B>(&self, req: &Request<B>) -> Resolution {
        let target = match page_header(req) {
            Ok(Some(page)) => page,
            Ok(None) => match target_from_path(req.uri().path()) {
                Some(target) => target,
                None => return Resolution::BadRequest(BAD_REQUEST),
            },
            Err(()) => return Resolution::BadRequest(INVALID_HEADER),
        };

        let resolution = match self.lookup(&target) {
            Some((page, via)) => Resolution::Page { target, page, via },
            None => Resolution::NotFound { target },
        };
        tracing::debug!(uri = %req.uri(), ?resolution, "resolved request");
        resolution
    }

    fn lookup(&self, target: &str) -> Option<(String, Via)> {
        let pages = &self.config.pages;
        if pages.contains_key(target) {
            return Some((target.to_string(), Via::Direct));
        }

        let mut target = target.to_string();
        if target.contains(DATA_ROUTE_MARKER) {
            target = self.data_route_target(&target);
            if pages.contains_key(&target) {
                return Some((target, Via::DataRoute));
            }
        }

        // Prerendered dynamic pages (`/posts/42`) never match a page name
        // directly. The first matching route decides, found or not.
        let matched = self
            .config
            .dynamic_routes
            .iter()
            .find(|compiled| compiled.regex.is_match(&target))?;
        let dest = matched.route.dest_path();
        pages
            .contains_key(dest)
            .then(|| (dest.to_string(), Via::Dynamic))
    }

    /// `/_next/data/<buildId>/a/b.json` → `/a/b`.
    fn data_route_target(&self, target: &str) -> String {
        let replaced = self.config.data_prefix.replace(target, "/");
        let stripped = replaced.strip_suffix(".json").unwrap_or(replaced.as_ref());
        let page = strip_locale(stripped);
        if page.is_empty() {
            INDEX_PAGE.to_string()
        } else {
            page.to_string()
        }
    }

    /// Route `req` and invoke the page handler.
    ///
    /// Bad requests and unknown pages are answered here. A load or handler
    /// failure is returned as an error; the caller fails the invocation.
    pub async fn dispatch(&self, req: Request<Body>) -> Result<Response<Body>, DispatchError> {
        let page = match self.resolve(&req) {
            Resolution::Page { page, .. } => page,
            Resolution::BadRequest(message) => {
                return Ok(text_response(StatusCode::BAD_REQUEST, message));
            }
            Resolution::NotFound { target } => {
                let header = req
                    .headers()
                    .get(PAGE_HEADER)
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned());
                let pages: Vec<&str> = self.config.page_names().collect();
                tracing::error!(
                    %target,
                    ?header,
                    uri = %req.uri(),
                    ?pages,
                    "no matching page in lambda"
                );
                return Ok(text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR,
                ));
            }
        };

        let Some(loader) = self.config.pages.get(&page) else {
            return Ok(text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR,
            ));
        };
        let module = loader.load().inspect_err(|e| {
            tracing::error!(%page, error = %e, "failed to load page module");
        })?;
        module.call(req).await.map_err(|source| {
            tracing::error!(%page, error = %source, "unhandled error during request");
            DispatchError::Handler { page, source }
        })
    }
}

/// The `x-nextjs-page` value. `Ok(None)` when absent or empty; `Err` when
/// repeated or not valid UTF-8.
fn page_header<B>(req: &Request<B>) -> Result<Option<String>, ()> {
    let mut values = req.headers().get_all(PAGE_HEADER).iter();
    let Some(value) = values.next() else {
        return Ok(None);
    };
    if values.next().is_some() {
        return Err(());
    }
    let value = std::str::from_utf8(value.as_bytes()).map_err(|_| ())?;
    Ok((!value.is_empty()).then(|| value.to_string()))
}

/// Page target from the request path: one trailing `/` removed, empty
/// becomes `/index`. `None` for paths that are not absolute.
fn target_from_path(path: &str) -> Option<String> {
    if !path.starts_with('/') {
        return None;
    }
    let path = strip_locale(path);
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    Some(if trimmed.is_empty() {
        INDEX_PAGE.to_string()
    } else {
        trimmed.to_string()
    })
}

/// Locale prefixes are not used; paths pass through unchanged.
fn strip_locale(path: &str) -> &str {
    path
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}
