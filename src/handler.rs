//! Handler trait and type erasure.
//!
//! The router stores handlers of different concrete types side by side, so
//! each one is wrapped once at registration time and kept behind a trait
//! object:
//!
//! ```text
//! async fn health(req: Request) -> Response { … }
//!        ↓ router.get("/health", health)
//! Arc::new(FnHandler(Arc::new(health)))   stored as BoxedHandler
//!        ↓ at request time
//! handler.call(req) → BoxFuture           one Arc clone + one virtual call
//! ```
//!
//! `call` does not invoke the function itself. The returned future does, on
//! its first poll, so a handler that panics before producing its future is
//! caught by the same unwind guard as one that panics while running.
//!
//! Closures work too, which is how handlers get at shared state:
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use vigil::{MetricsRegistry, Request, Router};
//! let registry = Arc::new(MetricsRegistry::new().expect("metrics register"));
//! let app = Router::new().get("/metrics", move |_req: Request| {
//!     let registry = Arc::clone(&registry);
//!     async move { vigil::endpoints::metrics(&registry) }
//! });
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// Satisfied automatically by any `Fn(Request) -> impl Future<Output = impl IntoResponse>`.
/// Sealed: only the blanket impl below can provide it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(Arc::new(self)))
    }
}

struct FnHandler<F>(Arc<F>);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let f = Arc::clone(&self.0);
        Box::pin(async move { (*f)(req).await.into_response() })
    }
}
