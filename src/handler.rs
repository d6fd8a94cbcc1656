//! Page handlers and their lazy loaders.
//!
//! A compiled page module can expose its request handler three ways: a
//! `render` export, a `default` export, or the module itself being callable.
//! [`ModuleExports`] is what a loader hands back; [`HandlerModule`] is the
//! one shape picked from it, resolved once when the module is first loaded
//! (`render` wins over `default`, which wins over a bare callable).
//!
//! A [`Loader`] is a zero-argument factory plus a once-cell. The factory runs
//! on first use and its resolved module is shared by every later request in
//! the process.

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("module for {page} exports no handler")]
    NoHandler { page: String },
    #[error("failed to load {page}: {message}")]
    Failed { page: String, message: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct HandlerError(pub String);

pub type HandlerFuture = BoxFuture<'static, Result<Response<Body>, HandlerError>>;

/// A request handler, shareable across connections.
pub type HandlerFn = Arc<dyn Fn(Request<Body>) -> HandlerFuture + Send + Sync>;

/// Wrap an async function as a [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Body>, HandlerError>> + Send + 'static,
{
    Arc::new(move |req| f(req).boxed())
}

/// What a loaded page module exports.
#[derive(Clone, Default)]
pub struct ModuleExports {
    pub render: Option<HandlerFn>,
    pub default: Option<HandlerFn>,
    /// The module itself, when it is a function.
    pub callable: Option<HandlerFn>,
}

impl ModuleExports {
    pub fn render(handler: HandlerFn) -> Self {
        Self {
            render: Some(handler),
            ..Self::default()
        }
    }

    pub fn default_export(handler: HandlerFn) -> Self {
        Self {
            default: Some(handler),
            ..Self::default()
        }
    }

    pub fn callable(handler: HandlerFn) -> Self {
        Self {
            callable: Some(handler),
            ..Self::default()
        }
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleExports")
            .field("render", &self.render.is_some())
            .field("default", &self.default.is_some())
            .field("callable", &self.callable.is_some())
            .finish()
    }
}

/// The handler shape of a loaded module.
#[derive(Clone)]
pub enum HandlerModule {
    Renderable(HandlerFn),
    DefaultExport(HandlerFn),
    Callable(HandlerFn),
}

impl HandlerModule {
    pub fn from_exports(page: &str, exports: ModuleExports) -> Result<Self, LoadError> {
        if let Some(render) = exports.render {
            Ok(Self::Renderable(render))
        } else if let Some(default) = exports.default {
            Ok(Self::DefaultExport(default))
        } else if let Some(callable) = exports.callable {
            Ok(Self::Callable(callable))
        } else {
            Err(LoadError::NoHandler {
                page: page.to_string(),
            })
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Renderable(_) => "render",
            Self::DefaultExport(_) => "default",
            Self::Callable(_) => "callable",
        }
    }

    pub fn call(&self, req: Request<Body>) -> HandlerFuture {
        match self {
            Self::Renderable(f) | Self::DefaultExport(f) | Self::Callable(f) => f(req),
        }
    }
}

impl fmt::Debug for HandlerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerModule::{}", self.kind())
    }
}

type Factory = Box<dyn Fn() -> Result<ModuleExports, LoadError> + Send + Sync>;

/// Lazily loads one page module, at most once per process.
pub struct Loader {
    page: String,
    factory: Factory,
    module: OnceCell<HandlerModule>,
}

impl Loader {
    pub fn new<F>(page: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<ModuleExports, LoadError> + Send + Sync + 'static,
    {
        Self {
            page: page.into(),
            factory: Box::new(factory),
            module: OnceCell::new(),
        }
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn is_loaded(&self) -> bool {
        self.module.get().is_some()
    }

    /// The resolved module, loading it on first call. A failed load is not
    /// cached; the next call runs the factory again.
    pub fn load(&self) -> Result<&HandlerModule, LoadError> {
        self.module.get_or_try_init(|| {
            tracing::debug!(page = %self.page, "loading page module");
            let exports = (self.factory)()?;
            HandlerModule::from_exports(&self.page, exports)
        })
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("page", &self.page)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
