//! Timing, label extraction and observer dispatch.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use http::Method;
use tracing::warn;

use crate::config::Config;
use crate::response::Response;

/// Route label used when no registered pattern matched. Client-supplied paths
/// never become label values.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Method label for extension methods on requests that matched no route.
pub const OTHER_METHOD: &str = "OTHER";

const STANDARD_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

/// Formats an instant as RFC 3339 UTC with second precision, e.g.
/// `2024-05-01T12:00:00Z`.
pub(crate) fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Who is emitting: resolved once from [`Config`], shared by every request.
#[derive(Clone, Debug)]
pub struct ServiceIdentity {
    pub service: Arc<str>,
    pub version: Arc<str>,
    pub hostname: Arc<str>,
}

impl From<&Config> for ServiceIdentity {
    fn from(config: &Config) -> Self {
        Self {
            service: Arc::from(config.service_name.as_str()),
            version: Arc::from(config.version.as_str()),
            hostname: Arc::from(config.hostname.as_str()),
        }
    }
}

/// What is known about a request before its handler runs.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub method: Method,
    pub path: String,
    pub route: Option<Arc<str>>,
    pub user_agent: String,
}

/// Everything observed about one completed request.
///
/// Built after the handler returns and dropped once every observer has seen it.
#[derive(Clone, Debug)]
pub struct RequestObservation {
    pub method: Method,
    /// Raw request path, as sent by the client.
    pub path: String,
    /// Registered pattern, `None` when nothing matched.
    pub route: Option<Arc<str>>,
    pub status: http::StatusCode,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
    pub user_agent: String,
    pub service: Arc<str>,
    pub hostname: Arc<str>,
}

impl RequestObservation {
    pub fn labels(&self) -> Labels<'_> {
        Labels::from(self)
    }
}

/// The bounded-cardinality label set `{method, route, status}`.
///
/// A method reaches the label as-is when it is one of the RFC 9110 methods or
/// when a route was registered for it. Any other token folds to
/// [`OTHER_METHOD`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Labels<'a> {
    pub method: &'a str,
    pub route: &'a str,
    pub status: &'a str,
}

impl<'a> From<&'a RequestObservation> for Labels<'a> {
    fn from(obs: &'a RequestObservation) -> Self {
        Self {
            method: method_label(&obs.method, obs.route.is_some()),
            route: obs.route.as_deref().unwrap_or(UNMATCHED_ROUTE),
            status: obs.status.as_str(),
        }
    }
}

fn method_label(method: &Method, routed: bool) -> &str {
    if routed || STANDARD_METHODS.contains(method) {
        method.as_str()
    } else {
        OTHER_METHOD
    }
}

/// Wall-clock timer for the handler window.
#[derive(Clone, Copy, Debug)]
pub struct RequestTimer(Instant);

impl RequestTimer {
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Time since [`start`](Self::start). Monotonic, never negative.
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

/// A consumer of completed-request observations.
///
/// Implementations must not block for long: they run on the request task,
/// after the handler, before the response is written.
pub trait Observer: Send + Sync {
    /// Short name used when reporting a fault in this observer.
    fn name(&self) -> &'static str;

    fn observe(&self, observation: &RequestObservation);
}

/// The observability pipeline: times the downstream handler, builds a
/// [`RequestObservation`] and hands it to each registered [`Observer`].
#[derive(Clone)]
pub struct Observability {
    identity: ServiceIdentity,
    observers: Vec<Arc<dyn Observer>>,
}

impl Observability {
    pub fn new(identity: ServiceIdentity) -> Self {
        Self { identity, observers: Vec::new() }
    }

    /// Appends an observer. Observers run in registration order.
    pub fn with_observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Runs `next` to completion, then observes its response.
    ///
    /// `next` is always awaited and its response is returned untouched.
    pub async fn around<F>(&self, ctx: RequestContext, next: F) -> Response
    where
        F: Future<Output = Response>,
    {
        let timer = RequestTimer::start();
        let response = next.await;
        let duration = timer.elapsed();

        let observation = RequestObservation {
            method: ctx.method,
            path: ctx.path,
            route: ctx.route,
            status: response.status_code(),
            duration,
            timestamp: Utc::now(),
            user_agent: ctx.user_agent,
            service: Arc::clone(&self.identity.service),
            hostname: Arc::clone(&self.identity.hostname),
        };
        self.emit(&observation);

        response
    }

    /// Delivers `observation` to every observer. A panicking observer is
    /// reported and does not stop the ones after it.
    pub fn emit(&self, observation: &RequestObservation) {
        for observer in &self.observers {
            if catch_unwind(AssertUnwindSafe(|| observer.observe(observation))).is_err() {
                warn!(observer = observer.name(), path = %observation.path, "observer panicked");
            }
        }
    }
}
