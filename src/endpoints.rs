//! Operational endpoints.
//!
//! | Path | Answers |
//! |---|---|
//! | `GET /health` | Is the process alive? Failure → restart. |
//! | `GET /ready` | Can it serve traffic? Failure → pulled from the load balancer. |
//! | `GET /` | Service name, description, version, host. |
//! | `GET /metrics` | Request counters and latency histograms, Prometheus text. |
//!
//! All four are ordinary routes, so they are observed like any other request.
//!
//! Readiness is unconditional until you register a [`ReadinessCheck`]. Gate it
//! on whatever the service cannot work without:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil::{CheckFuture, Config, Endpoints, MetricsRegistry, ReadinessCheck, Router};
//!
//! struct Database;
//!
//! impl ReadinessCheck for Database {
//!     fn name(&self) -> &str { "database" }
//!     fn check(&self) -> CheckFuture<'_> {
//!         Box::pin(async { Err("connection refused".to_owned()) })
//!     }
//! }
//!
//! let registry = Arc::new(MetricsRegistry::new().expect("metrics register"));
//! let endpoints = Endpoints::new(Arc::new(Config::default()), registry)
//!     .with_readiness_check(Database);
//! let router = endpoints.register(Router::new());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use http::StatusCode;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::{error, warn};

use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::middleware::observe::rfc3339;
use crate::request::Request;
use crate::response::{IntoResponse, Json, Response};
use crate::router::Router;

/// Future returned by [`ReadinessCheck::check`]: `Err` carries the reason.
pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// A dependency the service needs before it can take traffic.
pub trait ReadinessCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> CheckFuture<'_>;
}

#[derive(Serialize)]
struct Probe<'a> {
    status: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Serialize)]
struct Info<'a> {
    service: &'a str,
    description: &'a str,
    version: &'a str,
    timestamp: String,
    hostname: &'a str,
}

/// Liveness probe: `200 {"status":"healthy","timestamp":...}`.
///
/// No dependencies. If the process can answer HTTP at all, it is alive.
pub async fn liveness(_req: Request) -> Response {
    Json(Probe { status: "healthy", timestamp: rfc3339(Utc::now()), reason: None }).into_response()
}

/// Readiness probe. `200 {"status":"ready"}` when every check passes,
/// otherwise `503 {"status":"not ready","reason":"<name>: <error>"}` for the
/// first failing one.
pub async fn readiness(checks: &[Arc<dyn ReadinessCheck>]) -> Response {
    for check in checks {
        if let Err(reason) = check.check().await {
            warn!(check = check.name(), %reason, "readiness check failed");
            let body = Probe {
                status: "not ready",
                timestamp: rfc3339(Utc::now()),
                reason: Some(format!("{}: {reason}", check.name())),
            };
            return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
        }
    }
    Json(Probe { status: "ready", timestamp: rfc3339(Utc::now()), reason: None }).into_response()
}

/// Service info: name, description, version, timestamp and host.
pub fn info(config: &Config) -> Response {
    Json(Info {
        service: &config.service_name,
        description: &config.service_description,
        version: &config.version,
        timestamp: rfc3339(Utc::now()),
        hostname: &config.hostname,
    })
    .into_response()
}

/// Current metrics in the Prometheus text exposition format.
///
/// An encoding failure is a `500`; the series themselves are untouched.
pub fn metrics(registry: &MetricsRegistry) -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&registry.gather(), &mut buffer) {
        error!(?err, "failed to encode prometheus metrics");
        return Response::status(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Response::builder().bytes(encoder.format_type(), buffer)
}

/// The operational endpoint set and the state it reads.
pub struct Endpoints {
    config: Arc<Config>,
    registry: Arc<MetricsRegistry>,
    checks: Vec<Arc<dyn ReadinessCheck>>,
}

impl Endpoints {
    pub fn new(config: Arc<Config>, registry: Arc<MetricsRegistry>) -> Self {
        Self { config, registry, checks: Vec::new() }
    }

    pub fn with_readiness_check(mut self, check: impl ReadinessCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Registers `/health`, `/ready`, `/` and `/metrics` on `router`.
    pub fn register(self, router: Router) -> Router {
        let Self { config, registry, checks } = self;
        let checks: Arc<[Arc<dyn ReadinessCheck>]> = checks.into();

        router
            .get("/health", liveness)
            .get("/ready", move |_req: Request| {
                let checks = Arc::clone(&checks);
                async move { readiness(&checks).await }
            })
            .get("/", move |_req: Request| {
                let config = Arc::clone(&config);
                async move { info(&config) }
            })
            .get("/metrics", move |_req: Request| {
                let registry = Arc::clone(&registry);
                async move { metrics(&registry) }
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    struct Failing;

    impl ReadinessCheck for Failing {
        fn name(&self) -> &str { "database" }
        fn check(&self) -> CheckFuture<'_> {
            Box::pin(async { Err("connection refused".to_owned()) })
        }
    }

    struct Passing;

    impl ReadinessCheck for Passing {
        fn name(&self) -> &str { "cache" }
        fn check(&self) -> CheckFuture<'_> {
            Box::pin(async { Ok(()) })
        }
    }

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    fn assert_timestamp(v: &Value) {
        let ts = v["timestamp"].as_str().unwrap();
        chrono::DateTime::parse_from_rfc3339(ts).unwrap();
        assert!(ts.ends_with('Z'));
    }

    #[tokio::test]
    async fn readiness_without_checks_is_ready() {
        let res = readiness(&[]).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        let v = body(&res);
        assert_eq!(v["status"], "ready");
        assert!(v.get("reason").is_none());
        assert_timestamp(&v);
    }

    #[tokio::test]
    async fn readiness_reports_first_failing_check() {
        let checks: Vec<Arc<dyn ReadinessCheck>> = vec![Arc::new(Passing), Arc::new(Failing)];
        let res = readiness(&checks).await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let v = body(&res);
        assert_eq!(v["status"], "not ready");
        assert_eq!(v["reason"], "database: connection refused");
    }

    #[test]
    fn info_reflects_config() {
        let config = Config {
            service_name: "orders".to_owned(),
            service_description: "order service".to_owned(),
            version: "2.0.0".to_owned(),
            port: 8080,
            hostname: "pod-9".to_owned(),
        };
        let res = info(&config);
        assert_eq!(res.status_code(), StatusCode::OK);
        let v = body(&res);
        assert_eq!(v["service"], "orders");
        assert_eq!(v["description"], "order service");
        assert_eq!(v["version"], "2.0.0");
        assert_eq!(v["hostname"], "pod-9");
        assert_timestamp(&v);
    }

    #[test]
    fn metrics_uses_exposition_content_type() {
        let registry = MetricsRegistry::new().unwrap();
        registry.increment_request_count("GET", "/", "200");
        let res = metrics(&registry);
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some(prometheus::TEXT_FORMAT));
        assert!(std::str::from_utf8(res.body()).unwrap().contains("http_requests_total"));
    }
}
