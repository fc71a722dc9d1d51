//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. A match yields the handler,
//! the path parameters and the registered pattern itself, which the
//! observability pipeline uses as the route label.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};

/// A registered route: the pattern it was registered under and its handler.
#[derive(Clone)]
pub(crate) struct Route {
    pub(crate) template: Arc<str>,
    pub(crate) handler: BoxedHandler,
}

/// The outcome of a successful lookup.
pub(crate) struct Matched {
    pub(crate) route: Route,
    pub(crate) params: HashMap<String, String>,
}

/// The application router.
///
/// Build it once at startup; hand it to [`App::new`](crate::App::new).
/// Each [`Router::on`] call returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax and `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use vigil::{Request, Response, Router};
    /// # use http::Method;
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with an existing
    /// route. Routes are registered at startup, so this is a programming error.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, handler)
    }

    /// Shorthand for `on(Method::GET, ..)`.
    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.add(Method::GET, path, handler)
    }

    fn add(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = Route { template: Arc::from(path), handler: handler.into_boxed_handler() };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<Matched> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(Matched { route: matched.value.clone(), params })
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
