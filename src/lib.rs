//! # vigil
//!
//! An observability pipeline for HTTP services. Every request gets one JSON
//! log line and one update to a counter and a latency histogram. The service
//! gets the four endpoints an orchestrator expects.
//!
//! ## The contract
//!
//! Observation never changes the outcome of a request:
//!
//! - The handler always runs, and its response is returned untouched.
//! - Status is read only after the handler returns.
//! - Metric labels use the registered route pattern (`/users/{id}`), or
//!   `unmatched`, never the raw path.
//! - A failing observer is logged and skipped. A panicking handler becomes a
//!   fixed `500`, which is observed like any other response.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vigil::{
//!     App, Config, Endpoints, LogObserver, MetricsObserver, MetricsRegistry,
//!     Observability, Request, Response, Router, Server, ServiceIdentity,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vigil::Error> {
//!     let (stdout, _guard) = tracing_appender::non_blocking(std::io::stdout());
//!     let config = Arc::new(Config::from_env()?);
//!     let registry = Arc::new(MetricsRegistry::new()?);
//!
//!     let router = Endpoints::new(Arc::clone(&config), Arc::clone(&registry))
//!         .register(Router::new().get("/users/{id}", get_user));
//!
//!     let observability = Observability::new(ServiceIdentity::from(&*config))
//!         .with_observer(LogObserver::new(stdout))
//!         .with_observer(MetricsObserver::new(registry));
//!
//!     Server::bind(config.listen_addr())
//!         .await?
//!         .serve(App::new(router, observability))
//!         .await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//! ```

mod config;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod endpoints;
pub mod metrics;
pub mod middleware;

pub use config::Config;
pub use endpoints::{CheckFuture, Endpoints, ReadinessCheck};
pub use error::{ConfigError, Error};
pub use handler::Handler;
pub use metrics::{HistogramSnapshot, MetricsObserver, MetricsRegistry};
pub use middleware::{LogObserver, Observability, Observer, RequestObservation, ServiceIdentity};
pub use request::Request;
pub use response::{IntoResponse, Json, Response, ResponseBuilder};
pub use router::Router;
pub use server::{App, Server};
