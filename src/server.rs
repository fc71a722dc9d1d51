//! Request dispatch, HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` before sending SIGKILL. The server then:
//! 1. Stops calling `listener.accept()`.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http::header::USER_AGENT;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::middleware::{Observability, RequestContext, recover};
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// A router wrapped in the observability pipeline. Cheap to share via `Arc`.
pub struct App {
    router: Router,
    observability: Observability,
}

impl App {
    pub fn new(router: Router, observability: Observability) -> Self {
        Self { router, observability }
    }

    /// Core hot path: routes one request and produces one response.
    ///
    /// Every request is observed, including `404` (no route), `400` (unreadable
    /// body) and `500` (handler panic). Nothing here returns an error: all
    /// failures become responses.
    pub async fn handle<B>(&self, req: http::Request<B>) -> Response
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_owned();
        let user_agent = parts.headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        let matched = self.router.lookup(&parts.method, &path);
        let ctx = RequestContext {
            method: parts.method.clone(),
            path: path.clone(),
            route: matched.as_ref().map(|m| Arc::clone(&m.route.template)),
            user_agent,
        };

        self.observability
            .around(ctx, async move {
                let body = match body.collect().await {
                    Ok(collected) => collected.to_bytes(),
                    Err(e) => {
                        warn!(path = %path, error = %e, "failed to read request body");
                        return Response::status(StatusCode::BAD_REQUEST);
                    }
                };

                let Some(matched) = matched else {
                    return Response::status(StatusCode::NOT_FOUND);
                };

                let mut req = Request::new(parts.method, path.clone(), parts.headers, body);
                req.params = matched.params;
                req.route = Some(matched.route.template);
                recover::catch_panic(&path, matched.route.handler.call(req)).await
            })
            .await
    }
}

/// The HTTP server.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    /// Binds `addr`. Failing to bind is fatal to the caller.
    ///
    /// ```rust,no_run
    /// # async fn run() -> Result<(), vigil::Error> {
    /// let server = vigil::Server::bind("0.0.0.0:8080".parse().unwrap()).await?;
    /// # Ok(()) }
    /// ```
    pub async fn bind(addr: SocketAddr) -> Result<Self, Error> {
        Ok(Self { listener: TcpListener::bind(addr).await? })
    }

    /// Wraps an already bound listener (an ephemeral port in tests, for example).
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves `app` until SIGTERM or Ctrl-C, then drains in-flight connections.
    pub async fn serve(self, app: App) -> Result<(), Error> {
        self.serve_with_shutdown(app, shutdown_signal()).await
    }

    /// Serves `app` until `shutdown` resolves, then drains in-flight connections.
    pub async fn serve_with_shutdown(
        self,
        app: App,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr = self.local_addr()?;

        // Shared across connection tasks without copying the routing table.
        let app = Arc::new(app);

        let identity = app.observability.identity();
        info!(
            addr = %addr,
            service = %identity.service,
            version = %identity.version,
            "listening"
        );

        // JoinSet tracks every spawned connection task so shutdown can wait
        // for all of them.
        let mut tasks = tokio::task::JoinSet::new();

        // `select!` polls the shutdown future on every iteration, so it must
        // not move between polls. `tokio::pin!` pins it on the stack.
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Arms are checked top to bottom. Shutdown comes first so a
                // signal stops accepting even while connections are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = self.listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    // TokioIo adapts tokio's AsyncRead/AsyncWrite to hyper's
                    // IO traits.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // `service_fn` turns an async fn into a hyper
                        // `Service`. The closure runs once per request on the
                        // connection, not once per connection.
                        let svc = service_fn(move |req| {
                            let app = Arc::clone(&app);
                            async move { dispatch(app, req).await }
                        });

                        // `auto::Builder` serves HTTP/1.1 or HTTP/2, whichever
                        // the client speaks.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the set stays bounded on
                // long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: every in-flight connection finishes before we return.
        while tasks.join_next().await.is_some() {}

        info!("stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Hands one request to [`App::handle`] on its own task.
///
/// hyper drops the service future when the client disconnects. Running the
/// pipeline on a spawned task means a request that reached its handler is
/// still observed after the peer is gone. The error type is
/// [`Infallible`]: every failure is already a response.
async fn dispatch(
    app: Arc<App>,
    req: hyper::Request<hyper::body::Incoming>,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_owned();
    let response = match tokio::spawn(async move { app.handle(req).await }).await {
        Ok(response) => response,
        Err(e) => {
            error!(path = %path, error = %e, "request task failed");
            recover::internal_error()
        }
    };
    Ok(response.into_inner())
}

/// Resolves on the first SIGTERM (Unix) or Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
