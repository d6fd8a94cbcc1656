//! Local HTTP bridge.
//!
//! Serves a [`Router`] over plain HTTP/1, one connection per accepted socket.
//! In a deployed bundle the Lambda event translation sits in front of the
//! router; locally this bridge stands in for it, for route debugging and
//! warmup pings.
//!
//! A request whose handler fails is not answered: the connection is dropped,
//! the same way a failed invocation surfaces to the caller.

use crate::handler::{HandlerError, Loader, ModuleExports, handler_fn};
use crate::router::Router;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

/// Accept connections until the listener fails.
pub async fn serve(router: Router, listener: TcpListener) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "bridge listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let router = router.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let router = router.clone();
                async move { router.dispatch(req.map(Body::new)).await }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::warn!(%peer, error = %e, "connection aborted");
            }
        });
    }
}

/// A loader whose handler answers with a JSON description of the page and
/// its handler file instead of rendering it.
pub fn describe_loader(page: &str, file: &str) -> Loader {
    let body = serde_json::json!({ "page": page, "handler": file }).to_string();
    Loader::new(page, move || {
        let body = body.clone();
        Ok(ModuleExports::render(handler_fn(move |_req| {
            let body = body.clone();
            async move {
                let mut response = Response::new(Body::from(body));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok::<_, HandlerError>(response)
            }
        })))
    })
}
