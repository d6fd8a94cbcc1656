//! # Next Lambda Adapter
//!
//! Turns the output of the Next.js serverless builder into what a
//! proxy-plus-Lambda deployment needs: a routing table for the proxy and one
//! self-contained zip bundle per lambda.
//!
//! # Architecture: Translate, then Bundle
//!
//! ```text
//! 1. Upstream   next build         →  .serverless_nextjs/   (builder manifests)
//! 2. Translate  manifests          →  build/proxy-config.json
//! 3. Bundle     lambda directories →  build/__NEXT_API_LAMBDA_0.zip
//!                                     build/__NEXT_PAGE_LAMBDA_0.zip
//! ```
//!
//! Translation is a pure function from the four manifests to a
//! [`translate::Translation`]: the proxy config and, per lambda, the
//! [`build_info::BuildInfo`] its router runs on. Bundling is the only stage
//! with side effects: it copies, generates, compiles and archives.
//!
//! At runtime each bundle's [`router::Router`] maps a request to one page
//! handler, from the `x-nextjs-page` header the proxy sets, or from the path.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`manifest`] | Builder manifest types and loading |
//! | [`escape`] | Regex escaping rules for route patterns and build ids |
//! | [`routes`] | Route table types and the ordered route table |
//! | [`build_info`] | Per-bundle router data and its generated module |
//! | [`translate`] | Manifests → proxy config + bundle specs |
//! | [`bundle`] | Ordered bundle assembly steps |
//! | [`archive`] | Directory copy, file listing, zip writing |
//! | [`exec`] | External command invocation (upstream build, bundler) |
//! | [`handler`] | Page handler shapes and lazy loaders |
//! | [`router`] | Request → page resolution and dispatch |
//! | [`bridge`] | Local HTTP/1 server for a router |
//! | [`config`] | `adapter.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Ordered Route Table
//!
//! The proxy evaluates routes top to bottom, so the emitted order is part of
//! the contract: trailing-slash redirect, the `filesystem` phase marker, API
//! routes, server-rendered pages, data routes, prerendered pages, dynamic
//! routes and their page fallbacks, the `hit` and `error` markers, then the
//! catch-all `/.*` 404. Manifest objects are deserialized into `IndexMap`s so
//! builder order survives into the table.
//!
//! ## Prerendered Pages Come After the Data Routes
//!
//! A prerendered page is skipped where the other server-rendered pages are
//! emitted, and so is its data route. Both get their own rules after the
//! data routes, with the page lambda in route form (`/__NEXT_PAGE_LAMBDA_0`)
//! as destination.
//!
//! ## Handlers Are Loaded Once
//!
//! Page modules are expensive to load, so each page has a [`handler::Loader`]:
//! a zero-argument factory behind a once-cell. The first request pays for the
//! load; every later request in the process reuses the resolved handler.

pub mod archive;
pub mod bridge;
pub mod build_info;
pub mod bundle;
pub mod config;
pub mod escape;
pub mod exec;
pub mod handler;
pub mod manifest;
pub mod output;
pub mod router;
pub mod routes;
pub mod translate;

#[cfg(test)]
pub(crate) mod test_helpers;
